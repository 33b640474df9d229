//! Test fixtures and engine helpers.
//!
//! The `team` entity mirrors a small company directory: 16 declared
//! fields, 18 members spread over 7 teams, 6 of them in Technology.

use facetdb_core::{Config, Document, Engine, EntityDef, FieldDef, FieldKind};
use serde_json::{json, Map, Value};
use std::path::Path;
use tempfile::TempDir;

/// Name of the fixture entity.
pub const TEAM: &str = "team";

/// Attachment field of the fixture entity.
pub const PICTURE_FIELD: &str = "pic";

/// Teams of the seed data, by descending head count.
pub const TEAMS: [&str; 7] = [
    "Technology",
    "Design",
    "Marketing",
    "Operations",
    "Sales",
    "Finance",
    "Legal",
];

/// Seed members: name, last name, team, location, seniority.
const MEMBERS: [(&str, &str, &str, &str, u32); 18] = [
    ("Ada", "Lovelace", "Technology", "London", 9),
    ("Alan", "Turing", "Technology", "London", 8),
    ("Grace", "Hopper", "Technology", "New York", 9),
    ("Linus", "Torvalds", "Technology", "Helsinki", 7),
    ("Margaret", "Hamilton", "Technology", "Boston", 8),
    ("Ken", "Thompson", "Technology", "New York", 6),
    ("Dieter", "Rams", "Design", "Berlin", 9),
    ("Paula", "Scher", "Design", "New York", 5),
    ("Jony", "Ive", "Design", "London", 7),
    ("Mary", "Wells", "Marketing", "New York", 4),
    ("David", "Ogilvy", "Marketing", "London", 6),
    ("Leo", "Burnett", "Marketing", "Chicago", 5),
    ("Henry", "Gantt", "Operations", "Boston", 3),
    ("Taiichi", "Ohno", "Operations", "Berlin", 6),
    ("Zig", "Ziglar", "Sales", "Chicago", 2),
    ("Mary", "Kay", "Sales", "Boston", 4),
    ("Luca", "Pacioli", "Finance", "Helsinki", 3),
    ("Ruth", "Ginsburg", "Legal", "Boston", 5),
];

/// Returns the `team` entity definition.
pub fn team_entity() -> EntityDef {
    EntityDef::new(TEAM, "Our team", "member")
        .field(FieldDef::new("name", FieldKind::String).label("First name"))
        .field(FieldDef::new("lastname", FieldKind::String).label("Last name"))
        .field(FieldDef::new("email", FieldKind::String))
        .field(FieldDef::new("phone", FieldKind::String))
        .field(FieldDef::new("team", FieldKind::StringSet).facet())
        .field(FieldDef::new("role", FieldKind::StringSet))
        .field(FieldDef::new("startDate", FieldKind::Date).label("Start date"))
        .field(FieldDef::new(PICTURE_FIELD, FieldKind::String).label("Picture"))
        .field(FieldDef::new("title", FieldKind::String))
        .field(FieldDef::new("location", FieldKind::String).facet())
        .field(FieldDef::new("office", FieldKind::String))
        .field(FieldDef::new("bio", FieldKind::String))
        .field(FieldDef::new("skills", FieldKind::StringSet))
        .field(FieldDef::new("twitter", FieldKind::String))
        .field(FieldDef::new("github", FieldKind::String))
        .field(FieldDef::new("seniority", FieldKind::Number))
        .attachment_field(PICTURE_FIELD)
        .pane(json!({ "layout": "cards", "title": "name", "subtitle": "team" }))
}

/// Returns the JSON bodies of the 18 seed members.
pub fn team_members() -> Vec<Map<String, Value>> {
    MEMBERS
        .iter()
        .enumerate()
        .map(|(i, (name, lastname, team, location, seniority))| {
            body(json!({
                "name": name,
                "lastname": lastname,
                "email": format!("{}.{}@example.com", name.to_lowercase(), lastname.to_lowercase()),
                "team": [team],
                "role": ["member"],
                "location": location,
                "startDate": format!("20{:02}-0{}-15T09:00:00Z", 10 + i % 10, 1 + i % 9),
                "seniority": seniority,
            }))
        })
        .collect()
}

/// Creates every seed member and returns the stored documents.
pub fn seed(engine: &Engine) -> Vec<Document> {
    team_members()
        .iter()
        .map(|body| engine.create(TEAM, body).expect("Failed to seed member"))
        .collect()
}

/// Opens an in-memory engine with the `team` entity, without documents.
pub fn empty_engine() -> Engine {
    Engine::open_in_memory([team_entity()]).expect("Failed to open in-memory engine")
}

/// Opens an in-memory engine holding the 18 seed members.
pub fn seeded_engine() -> Engine {
    let engine = empty_engine();
    seed(&engine);
    engine
}

/// A file-backed engine with automatic cleanup.
pub struct TestEngine {
    /// The engine instance.
    pub engine: Engine,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl TestEngine {
    /// Opens a file-backed engine in a fresh temporary directory.
    pub fn file() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let engine = open_at(dir.path());
        Self { engine, dir }
    }

    /// Returns the data directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Closes the engine and opens it again on the same directory.
    pub fn reopen(self) -> Self {
        let Self { engine, dir } = self;
        drop(engine);
        let engine = open_at(dir.path());
        Self { engine, dir }
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

fn open_at(path: &Path) -> Engine {
    let config = Config::new().data_dir(path).sync_on_write(false);
    Engine::open(config, [team_entity()]).expect("Failed to open file engine")
}

/// Converts a `json!` object literal into a body map.
pub fn body(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_entity_has_sixteen_fields() {
        let def = team_entity();
        assert_eq!(def.fields.len(), 16);
        def.check().unwrap();
    }

    #[test]
    fn seed_counts() {
        let engine = seeded_engine();
        assert_eq!(engine.list(TEAM).unwrap().num_found, 18);
        assert_eq!(engine.unique_facets(TEAM).unwrap()["team"].len(), 7);
        assert_eq!(
            engine
                .find_by_property(TEAM, "team", "Technology")
                .unwrap()
                .len(),
            6
        );
    }

    #[test]
    fn file_engine_survives_reopen() {
        let engine = TestEngine::file();
        seed(&engine);
        let engine = engine.reopen();
        assert_eq!(engine.list(TEAM).unwrap().num_found, 18);
        assert!(engine.path().join("journal.log").is_file());
    }
}
