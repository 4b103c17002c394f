use rand::RngCore;

/// Alphabet used for public object tokens.
pub const DEFAULT_ALPHABET: &str =
    "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("alphabet must contain at least two symbols, got {0}")]
    AlphabetTooSmall(usize),

    #[error("token length must be greater than zero")]
    ZeroLength,
}

/// Random word drawn from `length` bytes of OS randomness.
///
/// The bytes are read as one big-endian integer and re-encoded in the
/// alphabet's base, so the word carries `8 * length` bits of entropy.
pub fn random_word(length: usize, alphabet: &str) -> Result<String, TokenError> {
    if length == 0 {
        return Err(TokenError::ZeroLength);
    }
    let mut bytes = vec![0u8; length];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    encode_word(&bytes, alphabet)
}

/// Encode a big-endian integer in the alphabet's base, least significant
/// digit first. Zero encodes as the alphabet's first symbol.
pub fn encode_word(number: &[u8], alphabet: &str) -> Result<String, TokenError> {
    let symbols: Vec<char> = alphabet.chars().collect();
    let base = symbols.len();
    if base < 2 {
        return Err(TokenError::AlphabetTooSmall(base));
    }

    let mut digits: Vec<u8> = number.to_vec();
    let mut word = String::new();
    loop {
        let (quotient, remainder) = divmod(&digits, base as u32);
        word.push(symbols[remainder as usize]);
        if quotient.iter().all(|b| *b == 0) {
            break;
        }
        digits = quotient;
    }
    Ok(word)
}

/// Long division of a big-endian byte integer by a small divisor.
fn divmod(number: &[u8], divisor: u32) -> (Vec<u8>, u32) {
    let mut quotient = Vec::with_capacity(number.len());
    let mut remainder: u32 = 0;
    for byte in number {
        let acc = (remainder << 8) | u32::from(*byte);
        quotient.push((acc / divisor) as u8);
        remainder = acc % divisor;
    }
    let leading = quotient.iter().take_while(|b| **b == 0).count();
    quotient.drain(..leading);
    (quotient, remainder)
}
