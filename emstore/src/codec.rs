//! Fixed-width half-precision packing of embedding vectors.
//!
//! Every value written to the store is the concatenation of the vector's
//! components as little-endian IEEE binary16 numbers. The width is not stored
//! in the value; readers recover it from the build manifest.
//!
//! Conversion rounds to nearest, so the relative error inside the normal
//! binary16 range is at most 2^-11. Finite components whose magnitude exceeds
//! the largest finite half (65504) saturate to it; NaN and infinities are
//! rejected.

use half::f16;

use crate::error::{EmstoreError, Result};

/// Bytes used per vector component.
pub const BYTES_PER_COMPONENT: usize = 2;

/// Name of the value encoding, recorded in the build manifest.
pub const ENCODING_NAME: &str = "f16-le";

/// Encodes `vector` into `vector_size * 2` bytes.
pub fn encode(vector: &[f32], vector_size: usize) -> Result<Vec<u8>> {
    if vector.len() != vector_size {
        return Err(EmstoreError::SizeMismatch {
            expected: vector_size,
            actual: vector.len(),
        });
    }

    let mut value = Vec::with_capacity(encoded_len(vector_size));
    for (index, &component) in vector.iter().enumerate() {
        if !component.is_finite() {
            return Err(EmstoreError::NonFiniteComponent { index });
        }
        value.extend_from_slice(&to_half(component).to_le_bytes());
    }
    Ok(value)
}

/// Decodes a value produced by [`encode`].
pub fn decode(value: &[u8]) -> Result<Vec<f32>> {
    if value.len() % BYTES_PER_COMPONENT != 0 {
        return Err(EmstoreError::Format(format!(
            "encoded value of {} bytes is not a whole number of components",
            value.len()
        )));
    }

    Ok(value
        .chunks_exact(BYTES_PER_COMPONENT)
        .map(|pair| f16::from_le_bytes([pair[0], pair[1]]).to_f32())
        .collect())
}

/// Length in bytes of an encoded vector with `vector_size` components.
pub fn encoded_len(vector_size: usize) -> usize {
    vector_size * BYTES_PER_COMPONENT
}

/// Number of components held by an encoded value of `byte_len` bytes.
pub fn vector_size_of(byte_len: usize) -> Option<usize> {
    (byte_len % BYTES_PER_COMPONENT == 0).then_some(byte_len / BYTES_PER_COMPONENT)
}

fn to_half(component: f32) -> f16 {
    let limit = f16::MAX.to_f32();
    f16::from_f32(component.clamp(-limit, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encoded_width() {
        let vector = vec![0.1, -2.5, 1e-3, 300.0];
        let value = encode(&vector, 4).unwrap();
        assert_eq!(value.len(), 8);
        assert_eq!(vector_size_of(value.len()), Some(4));
    }

    #[test]
    fn test_size_mismatch() {
        let err = encode(&[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(
            err,
            EmstoreError::SizeMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_decode_within_half_precision() {
        let vector = vec![0.123_456, -0.5, 42.42, -1234.5, 7.0e-3];
        let decoded = decode(&encode(&vector, vector.len()).unwrap()).unwrap();

        assert_eq!(decoded.len(), vector.len());
        for (original, restored) in vector.iter().zip(&decoded) {
            let tolerance = original.abs() * 2f32.powi(-11);
            assert!(
                (original - restored).abs() <= tolerance,
                "{original} decoded as {restored}"
            );
        }
    }

    #[test]
    fn test_little_endian_layout() {
        // 1.0 is 0x3C00 in binary16.
        assert_eq!(encode(&[1.0], 1).unwrap(), vec![0x00, 0x3C]);
    }

    #[test]
    fn test_out_of_range_saturates() {
        let decoded = decode(&encode(&[1.0e6, -1.0e6], 2).unwrap()).unwrap();
        assert_eq!(decoded, vec![65504.0, -65504.0]);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(matches!(
            encode(&[0.5, f32::NAN], 2),
            Err(EmstoreError::NonFiniteComponent { index: 1 })
        ));
        assert!(matches!(
            encode(&[f32::NEG_INFINITY, 0.5], 2),
            Err(EmstoreError::NonFiniteComponent { index: 0 })
        ));
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        assert!(decode(&[0x00, 0x3C, 0x01]).is_err());
        assert_eq!(vector_size_of(3), None);
    }
}
