use rand::Rng;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const SECRET_KEY_CHARS: &[u8] =
    b"abcdefghijklmnopqrstuvwxyz0123456789!@#%^&*(-_=+)";

fn random_from(charset: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(charset[rng.gen_range(0..charset.len())]))
        .collect()
}

/// A random alphanumeric password, safe to embed in URLs and
/// SQL literals.
#[must_use]
pub fn password(len: usize) -> String {
    random_from(ALPHANUMERIC, len)
}

/// A 50-character Django `SECRET_KEY`.
#[must_use]
pub fn django_secret_key() -> String {
    random_from(SECRET_KEY_CHARS, 50)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_alphanumeric() {
        let pw = password(24);
        assert_eq!(pw.len(), 24);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn secret_keys_differ() {
        let a = django_secret_key();
        let b = django_secret_key();
        assert_eq!(a.len(), 50);
        assert_ne!(a, b);
    }
}
