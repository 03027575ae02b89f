//! The on-disk JSON copy of the managed rules, replayed at startup.

use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::MirrorError;
use crate::model::FirewallRule;

#[derive(Debug, Clone)]
pub struct Mirror {
    path: PathBuf,
}

impl Mirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Mirror { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the mirrored rules, in their stored order. `None` when no mirror was ever written.
    pub fn load(&self) -> Result<Option<Vec<FirewallRule>>, MirrorError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Replaces the mirror with `rules`.
    ///
    /// The new content is written to a temporary file of the same directory, readable by the
    /// owner only, synced, then renamed over the previous mirror: a crash leaves either the old
    /// or the new mirror, never a truncated one.
    pub fn save(&self, rules: &[FirewallRule]) -> Result<(), MirrorError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
        serde_json::to_writer_pretty(&mut file, rules)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path)?;

        debug!("Saved {} rules to {}", rules.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, ChainKind, Protocol};

    fn rules() -> Vec<FirewallRule> {
        vec![
            FirewallRule {
                handle: 7,
                chain: ChainKind::Input,
                protocol: Protocol::Tcp,
                port: 22,
                source_ip: None,
                action: Action::Accept,
                comment: "ssh".to_string(),
            },
            FirewallRule {
                handle: 9,
                chain: ChainKind::Output,
                protocol: Protocol::Any,
                port: 0,
                source_ip: Some("198.51.100.4".parse().unwrap()),
                action: Action::Drop,
                comment: String::new(),
            },
        ]
    }

    #[test]
    fn absent_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = Mirror::new(dir.path().join("rules.json"));
        assert!(mirror.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = Mirror::new(dir.path().join("sub").join("rules.json"));
        mirror.save(&rules()).unwrap();
        assert_eq!(mirror.load().unwrap(), Some(rules()));

        let mode = fs::metadata(mirror.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        mirror.save(&[]).unwrap();
        assert_eq!(mirror.load().unwrap(), Some(vec![]));
    }

    #[test]
    fn corrupt_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = Mirror::new(dir.path().join("rules.json"));
        fs::write(mirror.path(), "[{\"chain\": \"sideways\"").unwrap();
        assert!(matches!(mirror.load(), Err(MirrorError::Format(_))));
    }
}
