use anyhow::{Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand_core::OsRng;

/// Argon2id password hashing shared by every store.
#[derive(Clone, Default)]
pub struct Passwords {
    params: Params,
}

impl Passwords {
    /// Custom cost parameters. Tests use the minimum to stay fast.
    pub fn with_params(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Salted PHC-format hash of `password`.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("password hashing failed: {}", e))?;
        Ok(hash.to_string())
    }

    /// Checks `password` against a stored PHC hash. Unparseable hashes never verify.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
pub(crate) fn fast() -> Passwords {
    Passwords::with_params(
        Params::new(Params::MIN_M_COST, Params::MIN_T_COST, 1, None).expect("valid argon2 params"),
    )
}
