//! Hash helpers.
//!
//! - `hash_str` / `hash_value`: blake3, usados para fingerprints internos.
//! - `content_hash`: sha256 sobre fuente + escala + versión; clave de la
//!   caché de programas compilados y sufijo de los ficheros persistidos.

use blake3::Hasher;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::to_canonical_json;

/// Hashea un string y devuelve hex.
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Hash de un `Value` sobre su forma canónica (independiente del orden de claves).
pub fn hash_value(value: &Value) -> String { hash_str(&to_canonical_json(value)) }

/// Hash de contenido de un programa: bytes de la tabla, escala y versión.
///
/// La escala se serializa con `Display` de `f64`, de modo que `0.1` y `0.10`
/// producen el mismo hash.
pub fn content_hash(source: &[u8], target_scale_mmol: f64, version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source);
    hasher.update(target_scale_mmol.to_string().as_bytes());
    hasher.update(version.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// Prefijo corto (8 hex) usado en nombres de fichero.
pub fn short_hash(hash: &str) -> &str { hash.get(..8).unwrap_or(hash) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_depends_on_every_input() {
        let base = content_hash(b"step_id,function_id\n", 0.1, "1.0");
        assert_eq!(base.len(), 64);
        assert_eq!(base, content_hash(b"step_id,function_id\n", 0.1, "1.0"));
        assert_ne!(base, content_hash(b"step_id,function_id\n", 0.2, "1.0"));
        assert_ne!(base, content_hash(b"step_id,function_id\n", 0.1, "1.1"));
        assert_ne!(base, content_hash(b"step_id,function_id,x\n", 0.1, "1.0"));
        assert_eq!(short_hash(&base).len(), 8);
    }
}
