use argon2::Argon2;
use argon2::PasswordHasher;
use password_hash::PasswordVerifier;
use password_hash::{rand_core::OsRng, SaltString};
use secure_string::SecureString;

use crate::{
    configuration::Configuration,
    error::{WordbookError, WordbookResult},
};

static HASH_ALGORITHM: argon2::Algorithm = argon2::Algorithm::Argon2id;
static HASH_ALGORITHM_VERSION: argon2::Version = argon2::Version::V0x13;

/// An argon2id hash of a password in PHC string format.
#[derive(Debug)]
pub struct PasswordHash {
    argon_hash: SecureString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPasswordResult {
    /// True if the password matches the hash.
    pub matches: bool,
    /// True if the hash was recomputed with the current parameters and needs to be stored.
    pub modified: bool,
}

impl PasswordHash {
    pub fn new(
        plaintext_password: &SecureString,
        configuration: impl AsRef<Configuration>,
    ) -> WordbookResult<Self> {
        let configuration = configuration.as_ref();
        let salt = SaltString::generate(&mut OsRng);

        let argon_hash = build_argon2(configuration)?
            .hash_password(plaintext_password.unsecure().as_bytes(), &salt)
            .map_err(|error| WordbookError::PasswordArgon2IdHash {
                source: Box::new(error),
            })?
            .to_string()
            .into();

        Ok(Self { argon_hash })
    }

    /// Verify the password against this hash.
    /// If it matches, but was hashed with outdated parameters, then the hash is replaced with a fresh one.
    pub fn verify(
        &mut self,
        plaintext_password: &SecureString,
        configuration: impl AsRef<Configuration>,
    ) -> WordbookResult<VerifyPasswordResult> {
        let configuration = configuration.as_ref();
        let parsed_hash = argon2::password_hash::PasswordHash::new(self.argon_hash.unsecure())
            .map_err(|error| WordbookError::PasswordArgon2IdVerify {
                source: Box::new(error),
            })?;

        match build_argon2(configuration)?
            .verify_password(plaintext_password.unsecure().as_bytes(), &parsed_hash)
        {
            Ok(()) => {
                if did_parameters_change(&parsed_hash, configuration)? {
                    *self = Self::new(plaintext_password, configuration)?;
                    Ok(VerifyPasswordResult {
                        matches: true,
                        modified: true,
                    })
                } else {
                    Ok(VerifyPasswordResult {
                        matches: true,
                        modified: false,
                    })
                }
            }
            Err(argon2::password_hash::Error::Password) => Ok(VerifyPasswordResult {
                matches: false,
                modified: false,
            }),
            Err(error) => Err(WordbookError::PasswordArgon2IdVerify {
                source: Box::new(error),
            }),
        }
    }
}

fn build_argon2(configuration: &Configuration) -> WordbookResult<Argon2<'_>> {
    Argon2::new_with_secret(
        configuration.password_pepper.unsecure().as_bytes(),
        HASH_ALGORITHM,
        HASH_ALGORITHM_VERSION,
        // the correctness of the parameters was checked when creating the configuration
        configuration.build_argon2_parameters()?,
    )
    .map_err(|error| WordbookError::PasswordArgon2IdParameters {
        source: Box::new(error),
    })
}

/// Check if the password hashing parameters are different from the ones used for this hash.
fn did_parameters_change(
    parsed_hash: &argon2::password_hash::PasswordHash<'_>,
    configuration: &Configuration,
) -> WordbookResult<bool> {
    let algorithm_identifier = parsed_hash.algorithm;
    let algorithm_version = parsed_hash.version;
    let algorithm_parameters = argon2::Params::try_from(parsed_hash).map_err(|error| {
        WordbookError::PasswordArgon2IdRehash {
            source: Box::new(error),
        }
    })?;

    Ok(algorithm_identifier != HASH_ALGORITHM.ident()
        || algorithm_version != Some(HASH_ALGORITHM_VERSION.into())
        || !same_cost_parameters(
            &algorithm_parameters,
            &configuration.build_argon2_parameters()?,
        ))
}

/// Parameters parsed from a hash always carry the output length,
/// while configured parameters leave it at the default.
fn same_cost_parameters(a: &argon2::Params, b: &argon2::Params) -> bool {
    let output_len =
        |params: &argon2::Params| params.output_len().unwrap_or(argon2::Params::DEFAULT_OUTPUT_LEN);

    a.m_cost() == b.m_cost()
        && a.t_cost() == b.t_cost()
        && a.p_cost() == b.p_cost()
        && output_len(a) == output_len(b)
}

impl From<String> for PasswordHash {
    fn from(argon_hash: String) -> Self {
        Self {
            argon_hash: argon_hash.into(),
        }
    }
}

impl From<PasswordHash> for String {
    fn from(value: PasswordHash) -> Self {
        value.argon_hash.into_unsecure()
    }
}

#[cfg(test)]
mod tests {
    use secure_string::SecureString;

    use super::{same_cost_parameters, PasswordHash, VerifyPasswordResult};
    use crate::configuration::Configuration;

    #[test]
    fn test_default_output_length_equals_explicit_output_length() {
        let configured = argon2::Params::new(19456, 2, 1, None).unwrap();
        let parsed = argon2::Params::new(19456, 2, 1, Some(32)).unwrap();
        assert!(same_cost_parameters(&configured, &parsed));

        let longer_output = argon2::Params::new(19456, 2, 1, Some(64)).unwrap();
        assert!(!same_cost_parameters(&configured, &longer_output));
        let more_iterations = argon2::Params::new(19456, 3, 1, None).unwrap();
        assert!(!same_cost_parameters(&configured, &more_iterations));
    }

    #[test]
    fn test_stored_hash_is_not_upgraded_with_unchanged_parameters() {
        let configuration = Configuration::test_configuration();
        let password = SecureString::from("correct horse battery staple");
        let stored = String::from(PasswordHash::new(&password, &configuration).unwrap());

        let mut hash = PasswordHash::from(stored.clone());
        assert!(!hash.verify(&password, &configuration).unwrap().modified);
        assert_eq!(String::from(hash), stored);
    }

    #[test]
    fn test_hash_is_argon2id_phc_string() {
        let configuration = Configuration::test_configuration();
        let hash = PasswordHash::new(&SecureString::from("correct horse"), &configuration).unwrap();
        assert!(String::from(hash).starts_with("$argon2id$v=19$"));
    }

    #[test]
    fn test_correct_password_matches() {
        let configuration = Configuration::test_configuration();
        let password = SecureString::from("correct horse battery staple");
        let mut hash = PasswordHash::new(&password, &configuration).unwrap();

        assert_eq!(
            hash.verify(&password, &configuration).unwrap(),
            VerifyPasswordResult {
                matches: true,
                modified: false
            }
        );
    }

    #[test]
    fn test_wrong_password_does_not_match() {
        let configuration = Configuration::test_configuration();
        let mut hash =
            PasswordHash::new(&SecureString::from("correct horse"), &configuration).unwrap();

        assert!(
            !hash
                .verify(&SecureString::from("incorrect horse"), &configuration)
                .unwrap()
                .matches
        );
    }

    #[test]
    fn test_pepper_is_part_of_the_hash() {
        let configuration = Configuration::test_configuration();
        let password = SecureString::from("correct horse");
        let mut hash = PasswordHash::new(&password, &configuration).unwrap();

        let mut other_configuration = Configuration::test_configuration();
        other_configuration.password_pepper = "another pepper".into();
        assert!(!hash.verify(&password, &other_configuration).unwrap().matches);
    }

    #[test]
    fn test_hash_is_upgraded_when_parameters_change() {
        let configuration = Configuration::test_configuration();
        let password = SecureString::from("correct horse");
        let mut hash = PasswordHash::from(String::from(
            PasswordHash::new(&password, &configuration).unwrap(),
        ));

        let mut upgraded_configuration = Configuration::test_configuration();
        upgraded_configuration.password_argon2id_iterations += 1;
        let result = hash.verify(&password, &upgraded_configuration).unwrap();
        assert_eq!(
            result,
            VerifyPasswordResult {
                matches: true,
                modified: true
            }
        );

        // the new hash verifies without further changes
        assert_eq!(
            hash.verify(&password, &upgraded_configuration).unwrap(),
            VerifyPasswordResult {
                matches: true,
                modified: false
            }
        );
    }
}
