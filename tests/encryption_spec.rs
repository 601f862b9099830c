use std::fs;
use std::path::Path;

use goalstack::db::{Database, EncryptionState, StoreError};
use goalstack::models::*;
use speculate2::speculate;

fn open(path: &Path) -> Database {
    Database::open(path, None).expect("Failed to open database")
}

fn open_err(path: &Path, passphrase: Option<&str>) -> StoreError {
    Database::open(path, passphrase)
        .err()
        .expect("open should have failed")
}

fn seed(db: &Database) -> Goal {
    let ws = db.ensure_default_workspace().expect("default workspace");
    db.add_goal(CreateGoalInput::new("Keep me").in_workspace(ws.id))
        .expect("Failed to create goal")
}

#[cfg(feature = "encryption")]
fn artifact(path: &Path, suffix: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(format!("{}{}", path.display(), suffix))
}

#[cfg(not(feature = "encryption"))]
mod unsupported {
    use super::*;

    speculate! {
        before {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("goalstack.db");
        }

        describe "without encryption support" {
            it "reports encryption as unavailable and non-fatal" {
                let db = open(&path);
                assert_eq!(db.encryption_state(), EncryptionState::UnencryptedUnsupported);

                let err = db.encrypt_database("pw").unwrap_err();
                assert!(matches!(err.cause(), StoreError::EncryptionUnavailable));
                assert!(err.is_non_fatal());
                assert!(db.rekey_database("pw").unwrap_err().is_non_fatal());
                assert!(db.recreate_encrypted_database("pw").unwrap_err().is_non_fatal());

                seed(&db);
                assert!(!db.is_encrypted());
            }

            it "refuses a file that is not plaintext SQLite as a fatal error" {
                fs::write(&path, [0x5a; 4096]).unwrap();
                let err = open_err(&path, Some("pw"));
                assert!(matches!(err.cause(), StoreError::UnreadableWithoutEncryption));
                assert!(!err.is_non_fatal());

                fs::write(&path, [0x5a; 48]).unwrap();
                let err = open_err(&path, None);
                assert!(matches!(err.cause(), StoreError::UnreadableWithoutEncryption));
                assert!(!err.is_non_fatal());
            }
        }
    }
}

#[cfg(feature = "encryption")]
mod supported {
    use super::*;

    speculate! {
        before {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("goalstack.db");
        }

        describe "with encryption support" {
            it "encrypts in place and needs the key afterwards" {
                let goal = {
                    let db = open(&path);
                    assert_eq!(db.encryption_state(), EncryptionState::Unencrypted);
                    let goal = seed(&db);
                    db.encrypt_database("k1").unwrap();
                    assert!(db.is_encrypted());
                    assert_eq!(db.get_goal(goal.id).unwrap().description, goal.description);
                    goal
                };

                let header = fs::read(&path).unwrap();
                assert!(!header.starts_with(b"SQLite format 3\0"));
                assert!(!artifact(&path, ".encrypting").exists());

                assert!(matches!(open_err(&path, None).cause(), StoreError::PassphraseRequired));
                let wrong = open_err(&path, Some("nope"));
                assert!(matches!(wrong.cause(), StoreError::WrongPassphrase));
                assert!(wrong.is_passphrase_problem());

                let db = Database::open(&path, Some("k1")).unwrap();
                assert_eq!(db.encryption_state(), EncryptionState::Encrypted);
                assert_eq!(db.get_goal(goal.id).unwrap().description, goal.description);
            }

            it "refuses to encrypt twice" {
                let db = open(&path);
                db.encrypt_database("k1").unwrap();
                assert!(db.encrypt_database("k2").is_err());
            }

            it "rekeys so only the new key opens the file" {
                {
                    let db = open(&path);
                    seed(&db);
                    db.encrypt_database("k1").unwrap();
                    db.rekey_database("k2").unwrap();
                    seed(&db);
                }

                assert!(matches!(open_err(&path, Some("k1")).cause(), StoreError::WrongPassphrase));
                let db = Database::open(&path, Some("k2")).unwrap();
                let ws = db.ensure_default_workspace().unwrap();
                assert_eq!(db.backlog(ws.id).unwrap().len(), 2);
            }

            it "rekey requires an encrypted store" {
                let db = open(&path);
                assert!(db.rekey_database("k").is_err());
            }

            it "recreates an empty store keeping workspaces and settings" {
                {
                    let db = open(&path);
                    let ws = db.ensure_default_workspace().unwrap();
                    db.set_setting("theme", "dark").unwrap();
                    db.recreate_encrypted_database("k1").unwrap();
                    assert!(db.is_encrypted());
                    assert_eq!(db.list_workspaces().unwrap()[0].id, ws.id);
                }

                let db = Database::open(&path, Some("k1")).unwrap();
                assert_eq!(db.get_setting("theme").unwrap().as_deref(), Some("dark"));
                assert_eq!(db.list_workspaces().unwrap().len(), 1);
            }

            it "refuses to recreate a store that holds goals" {
                let db = open(&path);
                seed(&db);
                let err = db.recreate_encrypted_database("k1").unwrap_err();
                assert!(matches!(err.cause(), StoreError::Validation { field: "state", .. }));
                assert!(!db.is_encrypted());
            }
        }
    }
}
