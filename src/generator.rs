//! Password generation.

use rand::Rng;

/// Characters usable in generated secrets. No `:`, so the result is safe
/// inside an HTTP Basic `username:password` pair, and no characters that
/// complicate the Base64 encoding of the authorization header.
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz\
ABCDEFGHIJKLMNOPQRSTUVWXYZ\
0123456789\
!@#-_^*";

/// Create a random password of the given size.
pub fn create_password(size: usize) -> String {
    let mut rng = rand::rng();
    (0..size)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
