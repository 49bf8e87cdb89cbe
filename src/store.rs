use crate::crypto::{MasterKey, decrypt_record, encrypt_record};
use crate::entry::OtpEntry;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no entry for label '{0}'")]
    NotFound(String),
    #[error("entry '{0}' is not counter-based")]
    NotCounterBased(String),
    #[error("label must be a non-empty relative name without '.' or '..' segments")]
    BadLabel,
}

/// Корневая директория хранилища (например, ~/.local/share/otpm-store).
pub fn store_root() -> anyhow::Result<PathBuf> {
    let mut dir = dirs::data_dir().ok_or_else(|| anyhow::anyhow!("cannot get data dir"))?;
    dir.push("otpm-store");
    Ok(dir)
}

fn check_label(label: &str) -> Result<(), StoreError> {
    if label.is_empty()
        || label.starts_with('/')
        || label.contains('\\')
        || label
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::BadLabel);
    }
    Ok(())
}

/// Каталог записей: label → OtpEntry.
///
/// Мутирующие методы берут `&mut self` — в пределах процесса это
/// сериализует изменения, и два конкурентных advance_counter по одной
/// метке не могут прочитать одинаковый счётчик.
pub trait EntryStore {
    /// Upsert: не больше одной записи на метку.
    fn put(&mut self, label: &str, entry: OtpEntry) -> anyhow::Result<()>;

    fn get(&self, label: &str) -> anyhow::Result<Option<OtpEntry>>;

    /// Удаление отсутствующей метки — no-op.
    fn delete(&mut self, label: &str) -> anyhow::Result<()>;

    /// Снимок каталога: последующие мутации не влияют на возвращённую map.
    fn list_all(&self) -> anyhow::Result<BTreeMap<String, OtpEntry>>;

    /// Продвигает счётчик hotp-записи ровно на единицу и сохраняет.
    /// Неизвестная метка — явный `StoreError::NotFound` (тихий no-op
    /// маскировал бы неудачный lookup), запись при этом не создаётся.
    fn advance_counter(&mut self, label: &str) -> anyhow::Result<u64> {
        let mut entry = self
            .get(label)?
            .ok_or_else(|| StoreError::NotFound(label.to_string()))?;
        let next = entry
            .bump_counter()
            .ok_or_else(|| StoreError::NotCounterBased(label.to_string()))?;
        self.put(label, entry)?;
        Ok(next)
    }
}

/// In-memory вариант каталога.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, OtpEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for MemoryStore {
    fn put(&mut self, label: &str, entry: OtpEntry) -> anyhow::Result<()> {
        check_label(label)?;
        self.entries.insert(label.to_string(), entry);
        Ok(())
    }

    fn get(&self, label: &str) -> anyhow::Result<Option<OtpEntry>> {
        Ok(self.entries.get(label).cloned())
    }

    fn delete(&mut self, label: &str) -> anyhow::Result<()> {
        self.entries.remove(label);
        Ok(())
    }

    fn list_all(&self) -> anyhow::Result<BTreeMap<String, OtpEntry>> {
        Ok(self.entries.clone())
    }
}

/// Долговременный вариант: по файлу на запись под `root`, содержимое
/// запечатано мастер-ключом. Метка — относительный путь, так что
/// `work/github` раскладывается по поддиректориям, как в pass-подобных
/// хранилищах.
pub struct VaultStore {
    root: PathBuf,
    key: MasterKey,
}

#[derive(Serialize, Deserialize)]
struct FileRecord {
    version: u32,
    nonce: String,
    ciphertext: String,
}

const RECORD_VERSION: u32 = 1;

impl VaultStore {
    pub fn new(root: impl Into<PathBuf>, key: MasterKey) -> Self {
        Self {
            root: root.into(),
            key,
        }
    }

    fn entry_file(&self, label: &str) -> Result<PathBuf, StoreError> {
        check_label(label)?;
        // ".enc" приклеивается, а не подменяет "расширение" метки:
        // метки "github" и "github.com" не должны попасть в один файл.
        Ok(self.root.join(format!("{label}.enc")))
    }
}

impl EntryStore for VaultStore {
    fn put(&mut self, label: &str, entry: OtpEntry) -> anyhow::Result<()> {
        let path = self.entry_file(label)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let plaintext = serde_json::to_vec(&entry)?;
        let (nonce, ciphertext) = encrypt_record(&self.key, &plaintext)?;
        let record = serde_json::to_string_pretty(&FileRecord {
            version: RECORD_VERSION,
            nonce,
            ciphertext,
        })?;

        // Хранилище учётных данных: каждая мутация коммитится сразу,
        // подтверждённый advance не должен потеряться при падении.
        let mut file = std::fs::File::create(&path)?;
        file.write_all(record.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn get(&self, label: &str) -> anyhow::Result<Option<OtpEntry>> {
        let path = self.entry_file(label)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read entry file {}", path.display()))?;
        let record: FileRecord = serde_json::from_str(&data)?;
        if record.version != RECORD_VERSION {
            anyhow::bail!("unsupported entry file version {}", record.version);
        }
        let plaintext = decrypt_record(&self.key, &record.nonce, &record.ciphertext)
            .with_context(|| format!("cannot decrypt entry '{label}'"))?;
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    fn delete(&mut self, label: &str) -> anyhow::Result<()> {
        let path = self.entry_file(label)?;
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn list_all(&self) -> anyhow::Result<BTreeMap<String, OtpEntry>> {
        let mut entries = BTreeMap::new();
        if !self.root.exists() {
            return Ok(entries);
        }

        for item in WalkDir::new(&self.root) {
            let item = item?;
            if !item.file_type().is_file() {
                continue;
            }
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("enc") {
                continue;
            }

            let rel = path.strip_prefix(&self.root)?;
            let mut label = rel.to_string_lossy().into_owned();
            label.truncate(label.len() - ".enc".len());
            if std::path::MAIN_SEPARATOR != '/' {
                label = label.replace(std::path::MAIN_SEPARATOR, "/");
            }

            if let Some(entry) = self.get(&label)? {
                entries.insert(label, entry);
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{OtpKind, ValidationError};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::path::Path;

    const SECRET: &str = "JBSWY3DPEHPK3PXP";

    fn totp_entry() -> OtpEntry {
        OtpEntry::new(SECRET, OtpKind::Totp, None).unwrap()
    }

    fn hotp_entry(counter: u64) -> OtpEntry {
        OtpEntry::new(SECRET, OtpKind::Hotp, Some(counter)).unwrap()
    }

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("otpm-store-test-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn put_is_an_upsert() {
        let mut store = MemoryStore::new();
        store.put("github", hotp_entry(3)).unwrap();
        store.put("github", totp_entry()).unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["github"], totp_entry());
    }

    #[test]
    fn delete_is_a_noop_when_absent() {
        let mut store = MemoryStore::new();
        store.put("github", totp_entry()).unwrap();
        store.delete("nope").unwrap();
        store.delete("github").unwrap();
        store.delete("github").unwrap();
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn list_all_returns_a_snapshot() {
        let mut store = MemoryStore::new();
        store.put("github", hotp_entry(0)).unwrap();

        let snapshot = store.list_all().unwrap();
        store.advance_counter("github").unwrap();
        store.delete("github").unwrap();

        assert_eq!(snapshot["github"].counter(), Some(0));
    }

    #[test]
    fn advance_counter_twice_adds_exactly_two() {
        let mut store = MemoryStore::new();
        store.put("github", hotp_entry(0)).unwrap();

        assert_eq!(store.advance_counter("github").unwrap(), 1);
        assert_eq!(store.advance_counter("github").unwrap(), 2);
        assert_eq!(store.get("github").unwrap().unwrap().counter(), Some(2));
    }

    #[test]
    fn advance_counter_on_unknown_label_is_not_found_and_creates_nothing() {
        let mut store = MemoryStore::new();
        let err = store.advance_counter("ghost").unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::NotFound("ghost".to_string()))
        );
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn advance_counter_on_totp_entry_is_rejected() {
        let mut store = MemoryStore::new();
        store.put("github", totp_entry()).unwrap();
        let err = store.advance_counter("github").unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::NotCounterBased("github".to_string()))
        );
    }

    #[rstest]
    #[case("")]
    #[case("/etc/shadow")]
    #[case("../escape")]
    #[case("work/../escape")]
    #[case("work//github")]
    #[case("work\\..\\escape")]
    fn bad_labels_are_rejected(#[case] label: &str) {
        let mut store = MemoryStore::new();
        let err = store.put(label, totp_entry()).unwrap_err();
        assert_eq!(err.downcast_ref::<StoreError>(), Some(&StoreError::BadLabel));
    }

    #[test]
    fn vault_store_round_trips_across_reopen() {
        let root = temp_root("roundtrip");
        let key: MasterKey = [42u8; 32];

        let mut store = VaultStore::new(&root, key);
        store.put("github", hotp_entry(7)).unwrap();
        store.put("work/gitlab", totp_entry()).unwrap();

        let reopened = VaultStore::new(&root, key);
        assert_eq!(reopened.get("github").unwrap().unwrap(), hotp_entry(7));

        let all = reopened.list_all().unwrap();
        assert_eq!(
            all.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["github", "work/gitlab"]
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn vault_store_advance_is_durable() {
        let root = temp_root("advance");
        let key: MasterKey = [42u8; 32];

        let mut store = VaultStore::new(&root, key);
        store.put("github", hotp_entry(0)).unwrap();
        store.advance_counter("github").unwrap();
        store.advance_counter("github").unwrap();

        let reopened = VaultStore::new(&root, key);
        assert_eq!(reopened.get("github").unwrap().unwrap().counter(), Some(2));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn vault_store_delete_and_missing_get() {
        let root = temp_root("delete");
        let key: MasterKey = [42u8; 32];

        let mut store = VaultStore::new(&root, key);
        assert!(store.get("github").unwrap().is_none());
        store.delete("github").unwrap();

        store.put("github", totp_entry()).unwrap();
        store.delete("github").unwrap();
        assert!(store.get("github").unwrap().is_none());
        assert!(!Path::new(&root).join("github.enc").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    // Сквозной сценарий: код для счётчика 0, advance, код для счётчика 1.
    #[test]
    fn hotp_code_changes_after_advance() {
        let mut store = MemoryStore::new();
        store
            .put("github", {
                let secret = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
                OtpEntry::new(secret, OtpKind::Hotp, Some(0)).unwrap()
            })
            .unwrap();

        let before = crate::otp::current_code(&store.get("github").unwrap().unwrap()).unwrap();
        assert_eq!(before, "755224");

        store.advance_counter("github").unwrap();
        let after = crate::otp::current_code(&store.get("github").unwrap().unwrap()).unwrap();
        assert_eq!(after, "287082");
    }

    // Каталог хранит только то, что прошло конструктор.
    #[test]
    fn stored_entries_come_from_the_validating_constructor() {
        assert_eq!(
            OtpEntry::new("not base32", OtpKind::Totp, None).unwrap_err(),
            ValidationError::MalformedSecret
        );
    }
}
