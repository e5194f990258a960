//! Exception id bodies.

use rand::Rng;

/// Crockford base32 alphabet (no I, L, O, U).
const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Length of a generated id body.
pub const ID_BODY_LEN: usize = 26;

/// Prefix put in front of every id unless configured otherwise.
pub const DEFAULT_ID_PREFIX: &str = "AE_";

/// A fresh 26-character Crockford base32 id body.
pub fn generate_id_body() -> String {
    generate_id_body_with(&mut rand::rng())
}

/// Each symbol is drawn independently from the alphabet.
pub fn generate_id_body_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ID_BODY_LEN)
        .map(|_| CROCKFORD[rng.random_range(0..CROCKFORD.len())] as char)
        .collect()
}

/// Whether `body` looks like something [`generate_id_body`] produced.
pub fn is_crockford_id_body(body: &str) -> bool {
    body.len() == ID_BODY_LEN && body.bytes().all(|b| CROCKFORD.contains(&b))
}
