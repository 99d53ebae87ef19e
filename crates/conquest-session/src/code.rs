//! Random session codes and identity tokens.

use conquest_protocol::{Identity, SessionCode};
use rand::Rng;

/// Draws a random code from the session-code alphabet.
///
/// 32 symbols over 6 positions gives about 10^9 codes, so collisions are
/// rare, but callers that need uniqueness should use [`unique_code`].
pub fn generate_code<R: Rng>(rng: &mut R) -> SessionCode {
    SessionCode::generate(|n| rng.random_range(0..n))
}

/// Draws codes until one is not `taken`.
pub fn unique_code<R: Rng>(
    rng: &mut R,
    taken: impl Fn(&SessionCode) -> bool,
) -> SessionCode {
    loop {
        let code = generate_code(rng);
        if !taken(&code) {
            return code;
        }
        tracing::debug!(%code, "session code collision, regenerating");
    }
}

/// Issues a fresh identity: 128 random bits.
pub fn issue_identity() -> Identity {
    Identity::from(rand::rng().random::<[u8; 16]>())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use conquest_protocol::{SESSION_CODE_ALPHABET, SESSION_CODE_LEN};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_generate_code_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = generate_code(&mut rng);
            assert_eq!(code.as_str().len(), SESSION_CODE_LEN);
            assert!(
                code.as_str()
                    .bytes()
                    .all(|b| SESSION_CODE_ALPHABET.contains(&b))
            );
        }
    }

    #[test]
    fn test_unique_code_skips_taken_codes() {
        // Replaying the same seed reproduces the same first draw, so
        // marking that draw as taken forces a regeneration.
        let first = generate_code(&mut StdRng::seed_from_u64(99));
        let mut rng = StdRng::seed_from_u64(99);
        let code = unique_code(&mut rng, |c| *c == first);
        assert_ne!(code, first);
    }

    #[test]
    fn test_unique_code_never_repeats_live_codes() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut live = HashSet::new();
        for _ in 0..500 {
            let code = unique_code(&mut rng, |c| live.contains(c));
            assert!(live.insert(code));
        }
    }

    #[test]
    fn test_issue_identity_unique_hex() {
        let a = issue_identity();
        let b = issue_identity();
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
