use anyhow::{Result, bail};

pub const DEFAULT_SEED: u64 = 1337;

/// Resolve CLI seed tokens into distinct RNG seeds, in the order given.
///
/// Accepts decimal integers (negative values use their magnitude) and
/// `0x`-prefixed hex. An empty list falls back to [`DEFAULT_SEED`].
pub fn resolve_seeds(tokens: &[String]) -> Result<Vec<u64>> {
    let mut seeds: Vec<u64> = Vec::new();

    for token in tokens {
        if token.is_empty() {
            continue;
        }

        let seed = if let Some(hex) = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16).ok()
        } else if let Ok(value) = token.parse::<u64>() {
            Some(value)
        } else {
            token.parse::<i64>().ok().map(i64::unsigned_abs)
        };

        let Some(seed) = seed else {
            bail!("Unrecognized seed token: {token}");
        };
        if !seeds.contains(&seed) {
            seeds.push(seed);
        }
    }

    if seeds.is_empty() {
        seeds.push(DEFAULT_SEED);
    }

    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn resolves_decimal_negative_and_hex() {
        let seeds = resolve_seeds(&tokens(&["42", "-7", "0xff"])).unwrap();
        assert_eq!(seeds, vec![42, 7, 255]);
    }

    #[test]
    fn duplicates_collapse_in_order() {
        let seeds = resolve_seeds(&tokens(&["9", "0x9", "3", "9"])).unwrap();
        assert_eq!(seeds, vec![9, 3]);
    }

    #[test]
    fn empty_input_uses_default() {
        assert_eq!(resolve_seeds(&[]).unwrap(), vec![DEFAULT_SEED]);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(resolve_seeds(&tokens(&["orange"])).is_err());
    }
}
