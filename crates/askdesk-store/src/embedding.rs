//! Embedding BLOB encoding and vector helpers.

use ndarray::Array1;

/// Encode a float vector as little-endian f32 bytes (`len × 4`).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing partial words are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// L2-normalize into an owned array. Returns `None` for (near-)zero vectors.
pub fn normalized(vec: &[f32]) -> Option<Array1<f32>> {
    let arr = Array1::from_iter(vec.iter().copied());
    let norm = arr.dot(&arr).sqrt();
    if norm < 1e-9 {
        return None;
    }
    Some(arr / norm)
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, zero, or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    match (normalized(a), normalized(b)) {
        (Some(x), Some(y)) => x.dot(&y),
        _ => 0.0,
    }
}
