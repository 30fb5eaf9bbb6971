//! Random password generation

use rand::seq::SliceRandom;
use zeroize::Zeroizing;

use sv_core::{VaultError, VaultResult};

pub const MIN_LENGTH: usize = 8;
pub const MAX_LENGTH: usize = 32;

const LETTERS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";
const LOOKALIKES: &str = "il1Lo0O";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub length: usize,
    pub include_numbers: bool,
    pub include_symbols: bool,
    /// Drop i, l, 1, L, o, 0 and O
    pub exclude_lookalikes: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            length: 16,
            include_numbers: true,
            include_symbols: true,
            exclude_lookalikes: true,
        }
    }
}

impl GeneratorOptions {
    fn charset(&self) -> Vec<char> {
        let mut set: String = LETTERS.to_string();
        if self.include_numbers {
            set.push_str(DIGITS);
        }
        if self.include_symbols {
            set.push_str(SYMBOLS);
        }
        set.chars()
            .filter(|c| !(self.exclude_lookalikes && LOOKALIKES.contains(*c)))
            .collect()
    }
}

/// Draw `options.length` characters uniformly from the selected alphabet
/// using the OS CSPRNG.
pub fn generate_password(options: &GeneratorOptions) -> VaultResult<Zeroizing<String>> {
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&options.length) {
        return Err(VaultError::Config(format!(
            "password length must be between {MIN_LENGTH} and {MAX_LENGTH}, got {}",
            options.length
        )));
    }

    let charset = options.charset();
    let mut rng = rand::rngs::OsRng;
    let mut password = Zeroizing::new(String::with_capacity(options.length));
    for _ in 0..options.length {
        // charset is never empty: letters survive every option combination
        if let Some(c) = charset.choose(&mut rng) {
            password.push(*c);
        }
    }
    Ok(password)
}
