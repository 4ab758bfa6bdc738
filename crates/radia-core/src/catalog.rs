//! Station catalog and selection cursor.
//!
//! Stations are keyed by id. The user-facing order is always derived fresh
//! from the map: ascending by name, ties broken by ascending id.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub id: u32,
    pub name: String,
    pub stream_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot read station list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed station list {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("station list {path}: invalid id {id:?}")]
    InvalidId { path: PathBuf, id: String },
    #[error("station list {path} has no stations")]
    Empty { path: PathBuf },
}

// ── JSON station file ─────────────────────────────────────────────────────────

/// On-disk layout: `{"stanice": [{"id": .., "nazov": .., "url": ..}, ...]}`.
#[derive(Debug, Deserialize)]
struct JsonStationFile {
    stanice: Vec<JsonStation>,
}

#[derive(Debug, Deserialize)]
struct JsonStation {
    id: JsonId,
    nazov: String,
    url: String,
}

/// Station files in the wild carry ids both as numbers and as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonId {
    Number(u32),
    Text(String),
}

impl JsonId {
    fn parse(&self) -> Option<u32> {
        match self {
            JsonId::Number(n) => Some(*n),
            JsonId::Text(s) => s.trim().parse().ok(),
        }
    }

    fn raw(&self) -> String {
        match self {
            JsonId::Number(n) => n.to_string(),
            JsonId::Text(s) => s.clone(),
        }
    }
}

pub fn parse_stations_from_json_str(
    content: &str,
    path: &Path,
) -> Result<Vec<Station>, CatalogError> {
    let file: JsonStationFile =
        serde_json::from_str(content).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    file.stanice
        .into_iter()
        .map(|s| {
            let id = s.id.parse().ok_or_else(|| CatalogError::InvalidId {
                path: path.to_path_buf(),
                id: s.id.raw(),
            })?;
            Ok(Station {
                id,
                name: s.nazov,
                stream_url: s.url,
            })
        })
        .collect()
}

pub fn load_stations_from_json(path: &Path) -> Result<Vec<Station>, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_stations_from_json_str(&content, path)
}

// ── catalog ───────────────────────────────────────────────────────────────────

/// Which source a catalog was populated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Primary,
    Backup,
    /// Both sources failed; the catalog is empty.
    Unavailable,
}

#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations: BTreeMap<u32, Station>,
}

impl StationCatalog {
    /// Later duplicates of an id replace earlier ones.
    pub fn from_stations(stations: impl IntoIterator<Item = Station>) -> Self {
        let stations = stations.into_iter().map(|s| (s.id, s)).collect();
        Self { stations }
    }

    /// Parse a single source. Zero stations counts as a failure.
    pub fn try_load(path: &Path) -> Result<Self, CatalogError> {
        let catalog = Self::from_stations(load_stations_from_json(path)?);
        if catalog.is_empty() {
            return Err(CatalogError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(catalog)
    }

    /// Load the primary list, falling back to the backup. Never fails: with
    /// both sources unusable the catalog is empty and the UI shows an error.
    pub fn load(primary: &Path, backup: &Path) -> (Self, CatalogSource) {
        match Self::try_load(primary) {
            Ok(catalog) => {
                info!("Loaded {} stations from {:?}", catalog.len(), primary);
                return (catalog, CatalogSource::Primary);
            }
            Err(e) => warn!("Primary station list unusable: {}", e),
        }
        match Self::try_load(backup) {
            Ok(catalog) => {
                info!("Loaded {} stations from backup {:?}", catalog.len(), backup);
                (catalog, CatalogSource::Backup)
            }
            Err(e) => {
                warn!("Backup station list unusable: {}", e);
                (Self::default(), CatalogSource::Unavailable)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Station> {
        self.stations.get(&id)
    }

    /// Stations in display order.
    pub fn sorted(&self) -> Vec<&Station> {
        let mut sorted: Vec<&Station> = self.stations.values().collect();
        // BTreeMap iteration is already id-ascending, so a stable sort by
        // name alone keeps the id tie-break.
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted
    }

    pub fn sorted_names(&self) -> Vec<&str> {
        self.sorted().into_iter().map(|s| s.name.as_str()).collect()
    }

    /// Exact name match. With duplicate names the lowest id wins.
    pub fn find_by_name(&self, name: &str) -> Option<&Station> {
        let found = self.sorted().into_iter().find(|s| s.name == name);
        if found.is_none() {
            debug!("No station named {:?}", name);
        }
        found
    }

    /// Station under the cursor, or none when the catalog is empty.
    pub fn selected(&self, cursor: &Cursor) -> Option<&Station> {
        self.sorted().get(cursor.index()).copied()
    }
}

// ── selection cursor ──────────────────────────────────────────────────────────

/// Index into [`StationCatalog::sorted`]. Stays in `0..count` for a
/// non-empty catalog and at 0 for an empty one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Move down one row. Returns false at the last station or when empty.
    pub fn next(&mut self, count: usize) -> bool {
        if self.index + 1 >= count {
            return false;
        }
        self.index += 1;
        true
    }

    /// Move up one row. Returns false at the first station.
    pub fn prev(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.index -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: u32, name: &str) -> Station {
        Station {
            id,
            name: name.to_string(),
            stream_url: format!("http://stream.example/{}", id),
        }
    }

    #[test]
    fn test_parse_numeric_and_string_ids() {
        let json = r#"{"stanice": [
            {"id": "7", "nazov": "Rádio Beat", "url": "http://icecast.example/beat"},
            {"id": 3, "nazov": "Evropa 2", "url": "http://icecast.example/e2"}
        ]}"#;
        let stations = parse_stations_from_json_str(json, Path::new("CZ.json")).unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].id, 7);
        assert_eq!(stations[0].name, "Rádio Beat");
        assert_eq!(stations[1].id, 3);
        assert_eq!(stations[1].stream_url, "http://icecast.example/e2");
    }

    #[test]
    fn test_parse_rejects_non_numeric_id() {
        let json = r#"{"stanice": [{"id": "beat", "nazov": "Beat", "url": "u"}]}"#;
        let err = parse_stations_from_json_str(json, Path::new("CZ.json")).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidId { ref id, .. } if id == "beat"));
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let json = r#"{"stanice": [{"id": 1, "url": "u"}]}"#;
        let err = parse_stations_from_json_str(json, Path::new("CZ.json")).unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }

    #[test]
    fn test_sorted_names_ascending_with_id_tiebreak() {
        let catalog = StationCatalog::from_stations(vec![
            station(9, "Impuls"),
            station(2, "Color"),
            station(5, "Impuls"),
            station(1, "Zet"),
        ]);
        assert_eq!(catalog.sorted_names(), vec!["Color", "Impuls", "Impuls", "Zet"]);
        let ids: Vec<u32> = catalog.sorted().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 5, 9, 1]);
        assert_eq!(catalog.find_by_name("Impuls").unwrap().id, 5);
    }

    #[test]
    fn test_sorted_names_stable_across_calls() {
        let catalog = StationCatalog::from_stations(vec![
            station(3, "b"),
            station(1, "c"),
            station(2, "a"),
        ]);
        let first: Vec<String> = catalog.sorted_names().iter().map(|s| s.to_string()).collect();
        for _ in 0..5 {
            assert_eq!(catalog.sorted_names(), first);
        }
    }

    #[test]
    fn test_find_by_name_is_exact() {
        let catalog = StationCatalog::from_stations(vec![station(1, "Rádio Beat")]);
        assert!(catalog.find_by_name("Rádio Beat").is_some());
        assert!(catalog.find_by_name("rádio beat").is_none());
        assert!(catalog.find_by_name("Rádio").is_none());
    }

    #[test]
    fn test_duplicate_id_last_wins() {
        let catalog = StationCatalog::from_stations(vec![station(1, "Old"), station(1, "New")]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(1).unwrap().name, "New");
    }

    #[test]
    fn test_cursor_single_station() {
        let catalog = StationCatalog::from_stations(vec![station(1, "A")]);
        let mut cursor = Cursor::new();
        assert!(!cursor.next(catalog.len()));
        assert!(!cursor.prev());
        assert_eq!(cursor.index(), 0);
        assert_eq!(catalog.selected(&cursor).unwrap().name, "A");
    }

    #[test]
    fn test_cursor_empty_catalog() {
        let catalog = StationCatalog::default();
        let mut cursor = Cursor::new();
        assert!(!cursor.next(catalog.len()));
        assert!(!cursor.prev());
        assert_eq!(cursor.index(), 0);
        assert!(catalog.selected(&cursor).is_none());
    }

    #[test]
    fn test_cursor_walks_and_stops_at_ends() {
        let mut cursor = Cursor::new();
        assert!(cursor.next(3));
        assert!(cursor.next(3));
        assert!(!cursor.next(3));
        assert_eq!(cursor.index(), 2);
        assert!(cursor.prev());
        assert!(cursor.prev());
        assert!(!cursor.prev());
        assert_eq!(cursor.index(), 0);
    }
}
