//! # CLI Command Implementations

use super::CliError;
use crate::api::{self, DescriptorJson, ItemJson, LoadResponse};
use crate::config::{Backend, Config};
use occistore_core::{
    EntityId, Session, StoreError,
    formats::{MAX_SNAPSHOT_PAYLOAD_SIZE, import_snapshot, snapshot_to_bytes},
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), StoreError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| StoreError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(StoreError::DeserializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, StoreError> {
    let canonical = path.canonicalize().map_err(|e| {
        StoreError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(StoreError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Canonicalize the parent directory of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, StoreError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        StoreError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;
    if !canonical_parent.is_dir() {
        return Err(StoreError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| StoreError::IoError("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

fn read_snapshot_file(path: &Path) -> Result<Vec<u8>, StoreError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_SNAPSHOT_PAYLOAD_SIZE as u64)?;
    std::fs::read(&validated).map_err(|e| StoreError::IoError(format!("Read file: {}", e)))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the protocol adapter.
pub async fn cmd_server(config: &Config) -> Result<(), CliError> {
    let session = load_or_create_session(config)?;
    let schema = config.load_schema();

    println!("occistore protocol adapter starting...");
    println!();
    println!("Configuration:");
    println!("  Address:    {}", config.address());
    println!("  Backend:    {}", config.backend.as_str());
    println!("  Database:   {:?}", config.database);
    println!("  Schema:     {}", if schema.is_some() { "loaded" } else { "none" });
    println!("  Validation: {}", config.validate_categories);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&config.address(), session, schema).await?;
    Ok(())
}

// =============================================================================
// QUERY COMMANDS
// =============================================================================

/// Show store statistics.
pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), CliError> {
    let session = load_or_create_session(config)?;
    let stats = session.graph().stats()?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": config.database.to_string_lossy(),
            "backend": config.backend.as_str(),
            "entities": stats.entities,
            "resources": stats.resources,
            "links": stats.links,
            "categories": stats.categories,
        }));
        return Ok(());
    }

    println!("occistore Status");
    println!("================");
    println!("Database:   {:?}", config.database);
    println!("Backend:    {}", config.backend.as_str());
    println!();
    println!("Entities:   {}", stats.entities);
    println!("Resources:  {}", stats.resources);
    println!("Links:      {}", stats.links);
    println!("Categories: {}", stats.categories);
    Ok(())
}

/// Show the descriptor of an entity.
pub fn cmd_find(config: &Config, json_mode: bool, id: &str) -> Result<(), CliError> {
    let session = load_or_create_session(config)?;
    let found = session.graph().find(&EntityId::new(id))?;

    if json_mode {
        let results: Vec<DescriptorJson> = found.into_iter().map(DescriptorJson::from).collect();
        print_json(&serde_json::json!({ "results": results }));
        return Ok(());
    }

    match found {
        Some(d) => {
            println!("Id:     {}", d.id);
            println!("Owner:  {}", d.owner);
            println!("Serial: {}", d.serial.value());
            println!("ETag:   {}", d.etag);
        }
        None => println!("Not found: {}", id),
    }
    Ok(())
}

/// Show the full content of an entity.
pub fn cmd_load(config: &Config, json_mode: bool, id: &str) -> Result<(), CliError> {
    let session = load_or_create_session(config)?;
    let loaded = session.graph().load(&EntityId::new(id))?;

    if json_mode {
        print_json(&serde_json::to_value(LoadResponse::success(loaded)).unwrap_or_default());
        return Ok(());
    }

    if loaded.kind.as_str().is_empty() {
        println!("Not found: {}", id);
        return Ok(());
    }
    println!("Id:     {}", loaded.id);
    println!("Kind:   {}", loaded.kind);
    let mixins: Vec<&str> = loaded.mixins.iter().map(|m| m.as_str()).collect();
    println!("Mixins: {}", mixins.join(", "));
    for (key, value) in session.graph().attributes(&loaded.id)? {
        println!("  {} = {}", key, value);
    }
    Ok(())
}

/// List the members of a category.
pub fn cmd_list(config: &Config, json_mode: bool, category: &str) -> Result<(), CliError> {
    let session = load_or_create_session(config)?;
    let handle = session.list(category, None)?;
    let items = session.next(&handle.cursor_id, 0, 0)?;

    if json_mode {
        let items: Vec<ItemJson> = items.into_iter().map(ItemJson::from).collect();
        print_json(&serde_json::json!({ "category": category, "items": items }));
        return Ok(());
    }

    println!("{} ({} entries)", category, items.len());
    for item in items {
        println!("  {}  owner={}", item.id, item.owner);
    }
    Ok(())
}

// =============================================================================
// MUTATING COMMANDS
// =============================================================================

/// Delete an entity or dissociate a mixin.
pub fn cmd_delete(config: &Config, id: &str) -> Result<(), CliError> {
    let mut session = load_or_create_session(config)?;
    let before = session.graph().entity_count()?;
    session.graph_mut().delete(id)?;
    let after = session.graph().entity_count()?;
    save_session(&session, config)?;

    println!("Deleted {} ({} entities removed)", id, before.saturating_sub(after));
    Ok(())
}

/// Write a binary snapshot of every entity.
pub fn cmd_export(config: &Config, output: &Path) -> Result<(), CliError> {
    let validated_output = validate_output_path(output)?;
    let session = load_or_create_session(config)?;

    let data = snapshot_to_bytes(session.graph())?;
    std::fs::write(&validated_output, &data)
        .map_err(|e| StoreError::IoError(format!("Write file: {}", e)))?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

/// Load a binary snapshot into the configured store.
pub fn cmd_import(config: &Config, input: &Path) -> Result<(), CliError> {
    let data = read_snapshot_file(input)?;
    let mut session = load_or_create_session(config)?;

    let count = import_snapshot(session.graph_mut(), &data)?;
    save_session(&session, config)?;

    println!("Imported {} entities", count);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the configured store.
///
/// The memory backend starts from the snapshot at `config.database` when
/// that file exists.
pub fn load_or_create_session(config: &Config) -> Result<Session, StoreError> {
    let hooks = config.hook_registry();
    let graph_config = config.graph_config();

    match config.backend {
        Backend::Redb => Session::with_redb(&config.database, hooks, graph_config),
        Backend::Memory => {
            let mut session = Session::in_memory(hooks, graph_config);
            if config.database.exists() {
                let data = read_snapshot_file(&config.database)?;
                import_snapshot(session.graph_mut(), &data)?;
            }
            Ok(session)
        }
    }
}

/// Persist a memory-backed session to its snapshot file. redb commits on write.
pub fn save_session(session: &Session, config: &Config) -> Result<(), StoreError> {
    match config.backend {
        Backend::Redb => Ok(()),
        Backend::Memory => {
            let data = snapshot_to_bytes(session.graph())?;
            std::fs::write(&config.database, &data)
                .map_err(|e| StoreError::IoError(format!("Write db: {}", e)))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use occistore_core::CategoryId;
    use tempfile::tempdir;

    fn config_at(path: PathBuf, backend: Backend) -> Config {
        Config {
            backend,
            database: path,
            ..Config::default()
        }
    }

    fn seed(session: &mut Session) {
        session
            .graph_mut()
            .save_resource(EntityId::new("vm1"), CategoryId::new("compute"), vec![], None, "alice")
            .expect("save");
        session
            .graph_mut()
            .save_resource(EntityId::new("net1"), CategoryId::new("network"), vec![], None, "alice")
            .expect("save");
        session
            .graph_mut()
            .save_link(
                EntityId::new("l1"),
                CategoryId::new("networkinterface"),
                vec![],
                EntityId::new("vm1"),
                EntityId::new("net1"),
                None,
                "alice",
            )
            .expect("link");
    }

    #[test]
    fn memory_backend_round_trips_through_snapshot_file() {
        let temp = tempdir().expect("temp dir");
        let config = config_at(temp.path().join("store.occi"), Backend::Memory);

        let mut session = load_or_create_session(&config).expect("open");
        seed(&mut session);
        save_session(&session, &config).expect("save");

        let reopened = load_or_create_session(&config).expect("reopen");
        assert_eq!(reopened.graph().entity_count().expect("count"), 3);
    }

    #[test]
    fn delete_command_cascades_and_persists() {
        let temp = tempdir().expect("temp dir");
        let config = config_at(temp.path().join("store.occi"), Backend::Memory);

        let mut session = load_or_create_session(&config).expect("open");
        seed(&mut session);
        save_session(&session, &config).expect("save");

        cmd_delete(&config, "vm1").expect("delete");

        let reopened = load_or_create_session(&config).expect("reopen");
        assert_eq!(reopened.graph().entity_count().expect("count"), 1);
    }

    #[test]
    fn export_then_import_into_redb() {
        let temp = tempdir().expect("temp dir");
        let memory = config_at(temp.path().join("store.occi"), Backend::Memory);
        let mut session = load_or_create_session(&memory).expect("open");
        seed(&mut session);
        save_session(&session, &memory).expect("save");

        let snapshot = temp.path().join("export.occi");
        cmd_export(&memory, &snapshot).expect("export");

        let redb = config_at(temp.path().join("store.redb"), Backend::Redb);
        cmd_import(&redb, &snapshot).expect("import");

        let session = load_or_create_session(&redb).expect("open redb");
        let vm = session
            .graph()
            .get(&EntityId::new("vm1"))
            .expect("get")
            .expect("vm1");
        assert!(vm.linked_from.contains(&EntityId::new("l1")));
    }

    #[test]
    fn import_rejects_missing_file() {
        let temp = tempdir().expect("temp dir");
        let config = config_at(temp.path().join("store.occi"), Backend::Memory);
        assert!(cmd_import(&config, &temp.path().join("missing.occi")).is_err());
    }
}
