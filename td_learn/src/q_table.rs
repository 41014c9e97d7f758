use crate::board::{Action, StateKey};
use crate::error::{Error, Result};
use chrono::offset::Local;
use itertools::Itertools;
use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Deref;
use std::path::Path;

/// Action values keyed by (canonical state, action).
///
/// Entries appear on first access and are only ever changed in place by TD
/// updates; nothing removes them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QTable {
    #[serde(serialize_with = "serialize_entries")]
    #[serde(deserialize_with = "deserialize_entries")]
    qtable: HashMap<(StateKey, Action), f64>,
}

impl Deref for QTable {
    type Target = HashMap<(StateKey, Action), f64>;
    fn deref(&self) -> &<Self as Deref>::Target {
        &self.qtable
    }
}

impl QTable {
    pub fn new() -> Self {
        QTable {
            qtable: HashMap::with_capacity(11000),
        }
    }

    /// Returns the stored value, inserting `default` first if the pair is unseen.
    pub fn value_or_insert(&mut self, key: StateKey, action: Action, default: f64) -> f64 {
        *self.qtable.entry((key, action)).or_insert(default)
    }

    pub fn value(&self, key: &StateKey, action: Action) -> Option<f64> {
        self.qtable.get(&(*key, action)).copied()
    }

    pub fn set(&mut self, key: StateKey, action: Action, value: f64) {
        self.qtable.insert((key, action), value);
    }

    /// Adds `delta` to an entry in place.
    pub fn add(&mut self, key: StateKey, action: Action, delta: f64) {
        *self.qtable.entry((key, action)).or_insert(0.0) += delta;
    }

    /// Distinct states with at least one stored action, sorted.
    pub fn states(&self) -> BTreeSet<StateKey> {
        self.qtable.keys().map(|(key, _)| *key).collect()
    }

    /// Writes one CSV row per entry: nine cell codes, the action index, the value.
    pub fn write_records<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        for ((key, action), value) in self.qtable.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            let record = key
                .codes()
                .iter()
                .map(|code| code.to_string())
                .chain([action.index().to_string(), value.to_string()])
                .collect::<Vec<String>>();
            wtr.write_record(&record)?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn read_records<R: Read>(reader: R) -> Result<QTable> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(reader);
        let mut q = QTable::new();
        for (i, record) in rdr.records().enumerate() {
            let record = record?;
            let line = i as u64 + 1;
            let invalid = |reason: String| Error::InvalidRecord { line, reason };
            if record.len() != 11 {
                return Err(invalid(format!("expected 11 fields, got {}", record.len())));
            }
            let codes = record
                .iter()
                .take(9)
                .map(|field| field.trim().parse::<u8>())
                .collect::<std::result::Result<Vec<u8>, _>>()
                .map_err(|e| invalid(e.to_string()))?;
            let key = StateKey::from_codes(&codes)
                .ok_or_else(|| invalid(format!("bad cell codes {codes:?}")))?;
            let action = record[9]
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(Action::from_index)
                .ok_or_else(|| invalid(format!("bad action index '{}'", &record[9])))?;
            let value = record[10]
                .trim()
                .parse::<f64>()
                .map_err(|e| invalid(e.to_string()))?;
            q.set(key, action, value);
        }
        Ok(q)
    }

    pub fn save_records(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| Error::Io {
            operation: "create",
            path: path.to_path_buf(),
            source,
        })?;
        self.write_records(BufWriter::new(file))
    }

    pub fn load_records(path: &Path) -> Result<QTable> {
        let file = File::open(path).map_err(|source| Error::Io {
            operation: "open",
            path: path.to_path_buf(),
            source,
        })?;
        QTable::read_records(BufReader::new(file))
    }

    /// Whole-table binary snapshot; [`QTable::restore`] reads it back verbatim.
    pub fn snapshot<W: Write>(&self, mut writer: W) -> Result<()> {
        serde_pickle::to_writer(&mut writer, self, serde_pickle::SerOptions::new())?;
        Ok(())
    }

    pub fn restore<R: Read>(reader: R) -> Result<QTable> {
        let decoded: QTable = serde_pickle::from_reader(reader, serde_pickle::DeOptions::new())?;
        Ok(decoded)
    }

    pub fn snapshot_to_disk(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| Error::Io {
            operation: "create",
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        self.snapshot(&mut writer)?;
        writer.flush().map_err(|source| Error::Io {
            operation: "write",
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn restore_from_disk(path: &Path) -> Result<QTable> {
        let file = File::open(path).map_err(|source| Error::Io {
            operation: "open",
            path: path.to_path_buf(),
            source,
        })?;
        QTable::restore(BufReader::new(file))
    }
}

/// `prefix-YYYY-MM-DD.ext`, using today's local date.
pub fn dated_file_name(prefix: &str, ext: &str) -> String {
    let today = Local::now().date_naive();
    format!("{prefix}-{today}.{ext}")
}

fn serialize_entries<S>(
    entries: &HashMap<(StateKey, Action), f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(entries.len()))?;
    for ((key, action), value) in entries {
        seq.serialize_element(&(key, action, value))?;
    }
    seq.end()
}

fn deserialize_entries<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<(StateKey, Action), f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<(StateKey, Action, f64)>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|(key, action, value)| ((key, action), value))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::GameState;

    fn key(s: &str) -> StateKey {
        s.parse::<GameState>().unwrap().to_state_key()
    }

    fn sample() -> QTable {
        let mut q = QTable::new();
        q.set(key("XO-/---/-O-"), Action::new(1, 1), 1.194);
        q.set(key("XO-/---/-O-"), Action::new(0, 2), 0.748);
        q.set(key("XOO/-X-/-O-"), Action::new(2, 2), 0.75);
        q.set(key("---/---/---"), Action::new(0, 0), -0.1 / 3.0);
        q
    }

    #[test]
    fn value_or_insert_creates_once() {
        let mut q = QTable::new();
        let k = key("X--/---/---");
        assert_eq!(q.value_or_insert(k, Action::new(1, 1), 0.5), 0.5);
        assert_eq!(q.value_or_insert(k, Action::new(1, 1), -3.0), 0.5);
        assert_eq!(q.len(), 1);
        q.add(k, Action::new(1, 1), 0.25);
        assert_eq!(q.value(&k, Action::new(1, 1)), Some(0.75));
        assert_eq!(q.value(&k, Action::new(2, 2)), None);
    }

    #[test]
    fn records_round_trip_exactly() {
        let q = sample();
        let mut buf = Vec::new();
        q.write_records(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.contains("1,2,0,0,0,0,0,2,0,4,1.194"));
        let restored = QTable::read_records(buf.as_slice()).unwrap();
        assert_eq!(restored, q);
    }

    #[test]
    fn malformed_record_is_reported() {
        let err = QTable::read_records("0,0,0,0,0,0,0,0,0,9,1.0\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { line: 1, .. }));
        let err = QTable::read_records("0,0,3,0,0,0,0,0,0,1,1.0\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { line: 1, .. }));
    }

    #[test]
    fn snapshot_restores_verbatim() {
        let q = sample();
        let mut buf = Vec::new();
        q.snapshot(&mut buf).unwrap();
        let restored = QTable::restore(buf.as_slice()).unwrap();
        assert_eq!(restored, q);
        assert_eq!(restored.states(), q.states());
    }

    #[test]
    fn snapshot_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(dated_file_name("qtable", "pickle"));
        let q = sample();
        q.snapshot_to_disk(&path).unwrap();
        assert_eq!(QTable::restore_from_disk(&path).unwrap(), q);
        let missing = dir.path().join("missing.pickle");
        assert!(matches!(
            QTable::restore_from_disk(&missing),
            Err(Error::Io { operation: "open", .. })
        ));
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        assert!(QTable::restore(&b"not a pickle"[..]).is_err());
    }

    #[test]
    fn dated_file_name_shape() {
        let name = dated_file_name("qtable-sarsa", "pickle");
        assert!(name.starts_with("qtable-sarsa-"));
        assert!(name.ends_with(".pickle"));
        assert_eq!(name.len(), "qtable-sarsa-".len() + 10 + ".pickle".len());
    }
}
