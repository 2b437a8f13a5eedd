use alloy::signers::local::PrivateKeySigner;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::{
    KeystoreError,
    decrypt_key,
};
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

/// Environment variable consulted before prompting for a keystore password.
pub const PASSWORD_ENV: &str = "PREDICTION_KEYSTORE_PASSWORD";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeystoreDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl KeystoreDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_keystore_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".foundry").join("keystores"))
}

pub fn resolve_keystore_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_keystore_dir(),
    }
}

/// Keystores are the plain files of `dir`, named after the file. A `.json`
/// extension is dropped from the name; hidden files are skipped.
pub fn list_keystores(dir: &Path) -> Result<Vec<KeystoreDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut keystores = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read keystore directory")? {
        let entry = entry.wrap_err("Failed to read keystore entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| eyre!("Invalid keystore filename {:?}", path))?;
        if file_name.starts_with('.') {
            continue;
        }
        let name = file_name.strip_suffix(".json").unwrap_or(file_name).to_owned();
        keystores.push(KeystoreDescriptor::new(name, path));
    }
    keystores.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(keystores)
}

pub fn find_keystore(dir: &Path, name: &str) -> Result<KeystoreDescriptor> {
    let keystores = list_keystores(dir)?;
    keystores
        .into_iter()
        .find(|k| k.name == name)
        .ok_or_else(|| eyre!("Keystore '{name}' not found in {}", dir.to_string_lossy()))
}

fn read_password(descriptor: &KeystoreDescriptor) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    let prompt = format!("Enter password for keystore '{}': ", descriptor.name);
    prompt_password(prompt).wrap_err("Failed to read keystore password")
}

pub fn unlock_keystore(descriptor: &KeystoreDescriptor) -> Result<PrivateKeySigner> {
    let password = read_password(descriptor)?;
    decrypt_signer(descriptor, &password)
}

pub fn decrypt_signer(
    descriptor: &KeystoreDescriptor,
    password: &str,
) -> Result<PrivateKeySigner> {
    let secret = match decrypt_key(&descriptor.path, password.as_bytes()) {
        Ok(secret) => secret,
        Err(KeystoreError::MacMismatch) => {
            return Err(eyre!("Invalid password for keystore '{}'", descriptor.name));
        }
        Err(err) => {
            return Err(err).wrap_err_with(|| {
                format!(
                    "Failed to decrypt keystore '{}' at {}",
                    descriptor.name,
                    descriptor.path.display()
                )
            });
        }
    };
    PrivateKeySigner::from_slice(&secret).map_err(|_| {
        eyre!(
            "Keystore '{}' contained unsupported key material",
            descriptor.name
        )
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn list_keystores__missing_dir_is_empty() {
        let dir = TempDir::new("keystores").unwrap();

        let keystores = list_keystores(&dir.path().join("nope")).unwrap();

        assert!(keystores.is_empty());
    }

    #[test]
    fn list_keystores__names_files_sorted_without_hidden() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        fs::write(dir.path().join("zed"), "{}").unwrap();
        fs::write(dir.path().join("alice.json"), "{}").unwrap();
        fs::write(dir.path().join(".DS_Store"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        // when
        let names: Vec<_> = list_keystores(dir.path())
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();

        // then
        assert_eq!(names, vec!["alice".to_string(), "zed".to_string()]);
    }

    #[test]
    fn find_keystore__unknown_name_is_an_error() {
        let dir = TempDir::new("keystores").unwrap();
        fs::write(dir.path().join("alice"), "{}").unwrap();

        let err = find_keystore(dir.path(), "bob").unwrap_err();

        assert!(err.to_string().contains("Keystore 'bob' not found"));
    }

    #[test]
    fn decrypt_signer__round_trips_a_generated_keystore() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        let mut rng = rand::thread_rng();
        let (secret, _uuid) =
            eth_keystore::new(dir.path(), &mut rng, "hunter2", Some("player")).unwrap();
        let expected = PrivateKeySigner::from_slice(&secret).unwrap();

        // when
        let descriptor = find_keystore(dir.path(), "player").unwrap();
        let signer = decrypt_signer(&descriptor, "hunter2").unwrap();

        // then
        assert_eq!(descriptor.path, dir.path().join("player"));
        assert_eq!(signer.address(), expected.address());
    }

    #[test]
    fn decrypt_signer__wrong_password_is_reported_as_such() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        let mut rng = rand::thread_rng();
        eth_keystore::new(dir.path(), &mut rng, "hunter2", Some("player")).unwrap();
        let descriptor = KeystoreDescriptor::new("player", dir.path().join("player"));

        // when
        let err = decrypt_signer(&descriptor, "wrong").unwrap_err();

        // then
        assert!(err.to_string().contains("Invalid password for keystore 'player'"));
    }

    #[test]
    fn decrypt_signer__missing_file_is_not_a_password_error() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        let descriptor = KeystoreDescriptor::new("ghost", dir.path().join("ghost"));

        // when
        let err = decrypt_signer(&descriptor, "hunter2").unwrap_err();

        // then
        let message = format!("{err:#}");
        assert!(message.contains("Failed to decrypt keystore 'ghost'"));
        assert!(!message.contains("Invalid password"));
    }

    #[test]
    fn decrypt_signer__malformed_keystore_is_not_a_password_error() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        fs::write(dir.path().join("broken"), "{}").unwrap();
        let descriptor = KeystoreDescriptor::new("broken", dir.path().join("broken"));

        // when
        let err = decrypt_signer(&descriptor, "hunter2").unwrap_err();

        // then
        assert!(!format!("{err:#}").contains("Invalid password"));
    }
}
