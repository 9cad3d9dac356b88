//! An in-memory [`CatalogBackend`], used by the compiler-validation tests in
//! `search` and by the task-manager/replication unit tests so those stay
//! pure and deterministic (per the ambient test-tooling stance).

use super::{CatalogBackend, MissingEventFile};
use crate::error::{LibrarianError, Result};
use crate::search::{self, Clause};
use async_trait::async_trait;
use librarian_model::{
    DeletionPolicy, File, FileEvent, FileInstance, FileName, FileRecInfo, ObsId, Observation,
    ObservingSession, SessionId, StandingOrder, Store, StoreId,
};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct State {
    files: HashMap<FileName, File>,
    events: Vec<FileEvent>,
    instances: HashMap<(StoreId, String, FileName), FileInstance>,
    observations: HashMap<ObsId, Observation>,
    sessions: HashMap<SessionId, ObservingSession>,
    standing_orders: Vec<StandingOrder>,
    stores: HashMap<StoreId, Store>,
}

/// Guarded by a single lock: the in-memory catalog never holds it across an
/// `.await` point, matching the coordinator-owned-state idiom used by the
/// task manager.
pub struct InMemoryCatalog {
    state: Mutex<State>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn seed_store(&self, store: Store) {
        self.state.lock().stores.insert(store.id, store);
    }
}

struct FileRecordContext<'a> {
    file: &'a File,
    observation: Option<ObservationContext>,
    events: &'a [FileEvent],
}

impl search::eval::RecordContext for FileRecordContext<'_> {
    fn attr(&self, name: &str) -> Option<search::ScalarValue> {
        use search::ScalarValue as S;
        match name {
            "name" => Some(S::Text(self.file.name.as_str().to_string())),
            "type" => Some(S::Text(self.file.file_type.clone())),
            "source" => Some(S::Text(self.file.source.clone())),
            "size" => Some(S::Int(self.file.size)),
            "obsid" => self.file.obsid.map(|o| S::Int(o.0)),
            "num-instances" => None,
            "create_time" => Some(S::Float(self.file.create_time.timestamp() as f64)),
            _ => None,
        }
    }

    fn obsid_is_null(&self) -> bool {
        self.file.obsid.is_none()
    }

    fn age_days(&self) -> Option<f64> {
        let elapsed = chrono::Utc::now() - self.file.create_time;
        Some(elapsed.num_seconds() as f64 / 86400.0)
    }

    fn observation(&self) -> Option<&dyn search::eval::RecordContext> {
        self.observation
            .as_ref()
            .map(|o| o as &dyn search::eval::RecordContext)
    }

    fn has_event(&self, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.name == self.file.name && e.event_type == event_type)
    }
}

struct ObservationContext(Observation);

impl search::eval::RecordContext for ObservationContext {
    fn attr(&self, name: &str) -> Option<search::ScalarValue> {
        use search::ScalarValue as S;
        match name {
            "obsid" => Some(S::Int(self.0.obsid.0)),
            "start_time_jd" => Some(S::Float(self.0.start_time_jd)),
            "stop_time_jd" => self.0.stop_time_jd.map(S::Float),
            "start_lst_hr" => self.0.start_lst_hr.map(S::Float),
            "session_id" => self.0.session_id.map(|s| S::Int(s.0)),
            _ => None,
        }
    }
}

#[async_trait]
impl CatalogBackend for InMemoryCatalog {
    async fn create_file(&self, file: &File) -> Result<()> {
        let mut state = self.state.lock();
        if state.files.contains_key(&file.name) {
            return Err(LibrarianError::Conflict(format!(
                "file {} already exists",
                file.name
            )));
        }
        state.files.insert(file.name.clone(), file.clone());
        Ok(())
    }

    async fn get_file(&self, name: &FileName) -> Result<File> {
        self.state
            .lock()
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| LibrarianError::NotFound(format!("file {name} not found")))
    }

    async fn file_exists(&self, name: &FileName) -> Result<bool> {
        Ok(self.state.lock().files.contains_key(name))
    }

    async fn append_event(&self, event: &FileEvent) -> Result<()> {
        let mut state = self.state.lock();
        if !state.files.contains_key(&event.name) {
            return Err(LibrarianError::NotFound(format!(
                "file {} not found",
                event.name
            )));
        }
        state.events.push(event.clone());
        Ok(())
    }

    async fn has_event(&self, name: &FileName, event_type: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .events
            .iter()
            .any(|e| &e.name == name && e.event_type == event_type))
    }

    async fn register_instance(&self, instance: &FileInstance) -> Result<bool> {
        let mut state = self.state.lock();
        let key = (
            instance.store_id,
            instance.parent_dirs.clone(),
            instance.name.clone(),
        );
        if state.instances.contains_key(&key) {
            return Ok(false);
        }
        state.instances.insert(key, instance.clone());
        Ok(true)
    }

    async fn list_instances(&self, name: &FileName) -> Result<Vec<FileInstance>> {
        Ok(self
            .state
            .lock()
            .instances
            .values()
            .filter(|i| &i.name == name)
            .cloned()
            .collect())
    }

    async fn first_instance(&self, name: &FileName) -> Result<Option<FileInstance>> {
        Ok(self
            .state
            .lock()
            .instances
            .values()
            .find(|i| &i.name == name)
            .cloned())
    }

    async fn set_deletion_policy(
        &self,
        name: &FileName,
        restrict_to_store: Option<StoreId>,
        policy: DeletionPolicy,
    ) -> Result<u64> {
        let mut state = self.state.lock();
        let mut changed = 0u64;
        for instance in state.instances.values_mut() {
            if &instance.name == name
                && restrict_to_store.is_none_or(|s| instance.store_id == s)
            {
                instance.deletion_policy = policy;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn remove_instances(&self, name: &FileName, store_ids: &[StoreId]) -> Result<u64> {
        let mut state = self.state.lock();
        let before = state.instances.len();
        state
            .instances
            .retain(|_, i| !(&i.name == name && store_ids.contains(&i.store_id)));
        Ok((before - state.instances.len()) as u64)
    }

    async fn create_or_update_observation(&self, obs: &Observation) -> Result<()> {
        self.state.lock().observations.insert(obs.obsid, *obs);
        Ok(())
    }

    async fn get_observation(&self, obsid: ObsId) -> Result<Option<Observation>> {
        Ok(self.state.lock().observations.get(&obsid).copied())
    }

    async fn unassigned_observations(
        &self,
        min_start_jd: Option<f64>,
        max_start_jd: Option<f64>,
    ) -> Result<Vec<Observation>> {
        Ok(self
            .state
            .lock()
            .observations
            .values()
            .filter(|o| o.session_id.is_none())
            .filter(|o| min_start_jd.is_none_or(|min| o.start_time_jd >= min))
            .filter(|o| max_start_jd.is_none_or(|max| o.start_time_jd <= max))
            .copied()
            .collect())
    }

    async fn sessions_in_range(
        &self,
        min_start_jd: Option<f64>,
        max_start_jd: Option<f64>,
    ) -> Result<Vec<ObservingSession>> {
        Ok(self
            .state
            .lock()
            .sessions
            .values()
            .filter(|s| min_start_jd.is_none_or(|min| s.stop_jd >= min))
            .filter(|s| max_start_jd.is_none_or(|max| s.start_jd <= max))
            .copied()
            .collect())
    }

    async fn create_session(&self, session: &ObservingSession) -> Result<()> {
        let mut state = self.state.lock();
        if state.sessions.values().any(|s| s.overlaps(session)) {
            return Err(LibrarianError::Conflict(format!(
                "session {} overlaps an existing session",
                session.id
            )));
        }
        state.sessions.insert(session.id, *session);
        Ok(())
    }

    async fn assign_observation_session(&self, obsid: ObsId, session_id: SessionId) -> Result<()> {
        let mut state = self.state.lock();
        let obs = state
            .observations
            .get_mut(&obsid)
            .ok_or_else(|| LibrarianError::NotFound(format!("observation {obsid} not found")))?;
        obs.session_id = Some(session_id);
        Ok(())
    }

    async fn gather_rec_info(&self, name: &FileName) -> Result<FileRecInfo> {
        let state = self.state.lock();
        let file = state
            .files
            .get(name)
            .ok_or_else(|| LibrarianError::NotFound(format!("file {name} not found")))?;
        let obs = file.obsid.and_then(|id| state.observations.get(&id));
        Ok(FileRecInfo {
            name: file.name.as_str().to_string(),
            file_type: file.file_type.clone(),
            source: file.source.clone(),
            size: file.size,
            digest: file.digest.as_str().to_string(),
            create_time: file.create_time,
            obsid: file.obsid.map(|o| o.0),
            session_id: obs.and_then(|o| o.session_id).map(|s| s.0),
            start_time_jd: obs.map(|o| o.start_time_jd),
            stop_time_jd: obs.and_then(|o| o.stop_time_jd),
        })
    }

    async fn search_files(&self, clause: &Clause) -> Result<Vec<File>> {
        let state = self.state.lock();
        Ok(state
            .files
            .values()
            .filter(|file| {
                let observation = file
                    .obsid
                    .and_then(|id| state.observations.get(&id).copied())
                    .map(ObservationContext);
                let ctx = FileRecordContext {
                    file,
                    observation,
                    events: &state.events,
                };
                search::evaluate(clause, &ctx)
            })
            .cloned()
            .collect())
    }

    async fn search_file_names(&self, clause: &Clause) -> Result<Vec<FileName>> {
        Ok(self
            .search_files(clause)
            .await?
            .into_iter()
            .map(|f| f.name)
            .collect())
    }

    async fn describe_session_without_event(
        &self,
        source: &str,
        event_type: &str,
    ) -> Result<Vec<MissingEventFile>> {
        let state = self.state.lock();
        let mut out = Vec::new();
        for file in state.files.values() {
            if file.source != source {
                continue;
            }
            let Some(obsid) = file.obsid else { continue };
            let has_event = state
                .events
                .iter()
                .any(|e| e.name == file.name && e.event_type == event_type);
            if !has_event {
                out.push(MissingEventFile {
                    file: file.clone(),
                    obsid,
                });
            }
        }
        Ok(out)
    }

    async fn list_standing_orders(&self) -> Result<Vec<StandingOrder>> {
        Ok(self.state.lock().standing_orders.clone())
    }

    async fn offloadable_instances(&self, store_id: StoreId, limit: i64) -> Result<Vec<FileInstance>> {
        let state = self.state.lock();
        Ok(state
            .instances
            .values()
            .filter(|i| i.store_id == store_id)
            .filter(|i| {
                state
                    .instances
                    .values()
                    .filter(|other| other.name == i.name)
                    .count()
                    == 1
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_store(&self, id: StoreId) -> Result<Store> {
        self.state
            .lock()
            .stores
            .get(&id)
            .cloned()
            .ok_or_else(|| LibrarianError::NotFound(format!("store {id} not found")))
    }

    async fn get_store_by_name(&self, name: &str) -> Result<Store> {
        self.state
            .lock()
            .stores
            .values()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| LibrarianError::NotFound(format!("store {name:?} not found")))
    }

    async fn list_stores(&self) -> Result<Vec<Store>> {
        Ok(self.state.lock().stores.values().cloned().collect())
    }

    async fn set_store_available(&self, id: StoreId, available: bool) -> Result<()> {
        let mut state = self.state.lock();
        let store = state
            .stores
            .get_mut(&id)
            .ok_or_else(|| LibrarianError::NotFound(format!("store {id} not found")))?;
        store.available = available;
        Ok(())
    }

    async fn upsert_store(&self, store: &Store) -> Result<Store> {
        let mut state = self.state.lock();
        if let Some(existing) = state.stores.values_mut().find(|s| s.name == store.name) {
            existing.ssh_host = store.ssh_host.clone();
            existing.path_prefix = store.path_prefix.clone();
            existing.http_prefix = store.http_prefix.clone();
            existing.available = store.available;
            return Ok(existing.clone());
        }
        let id = StoreId(state.stores.keys().map(|s| s.0).max().unwrap_or(0) + 1);
        let row = Store { id, ..store.clone() };
        state.stores.insert(id, row.clone());
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::EntityKind;
    use librarian_model::Digest;

    fn sample_file(name: &str, size: i64, source: &str) -> File {
        File {
            name: FileName::new(name).unwrap(),
            file_type: "uvh5".into(),
            source: source.into(),
            size,
            digest: Digest::new("deadbeef").unwrap(),
            create_time: chrono::Utc::now(),
            obsid: None,
        }
    }

    #[tokio::test]
    async fn create_file_rejects_duplicate_name() {
        let catalog = InMemoryCatalog::new();
        let file = sample_file("a.uv", 10, "correlator");
        catalog.create_file(&file).await.unwrap();
        let err = catalog.create_file(&file).await.unwrap_err();
        assert!(matches!(err, LibrarianError::Conflict(_)));
    }

    #[tokio::test]
    async fn search_files_filters_by_size_and_source() {
        let catalog = InMemoryCatalog::new();
        catalog
            .create_file(&sample_file("big.uv", 5000, "correlator"))
            .await
            .unwrap();
        catalog
            .create_file(&sample_file("small.uv", 10, "correlator"))
            .await
            .unwrap();
        let clause = search::compiler::compile_for(
            EntityKind::File,
            r#"{"size-greater-than": 1000, "source-is-exactly": "correlator"}"#,
        )
        .unwrap();
        let matched = catalog.search_files(&clause).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name.as_str(), "big.uv");
    }

    #[tokio::test]
    async fn offloadable_instances_excludes_files_with_other_copies() {
        let catalog = InMemoryCatalog::new();
        let unique = sample_file("unique.uv", 1, "correlator");
        let duped = sample_file("duped.uv", 1, "correlator");
        catalog.create_file(&unique).await.unwrap();
        catalog.create_file(&duped).await.unwrap();

        catalog
            .register_instance(&FileInstance {
                store_id: StoreId(1),
                parent_dirs: "d".into(),
                name: unique.name.clone(),
                deletion_policy: DeletionPolicy::Disallowed,
            })
            .await
            .unwrap();
        catalog
            .register_instance(&FileInstance {
                store_id: StoreId(1),
                parent_dirs: "d".into(),
                name: duped.name.clone(),
                deletion_policy: DeletionPolicy::Disallowed,
            })
            .await
            .unwrap();
        catalog
            .register_instance(&FileInstance {
                store_id: StoreId(2),
                parent_dirs: "d".into(),
                name: duped.name.clone(),
                deletion_policy: DeletionPolicy::Disallowed,
            })
            .await
            .unwrap();

        let offloadable = catalog
            .offloadable_instances(StoreId(1), 200)
            .await
            .unwrap();
        assert_eq!(offloadable.len(), 1);
        assert_eq!(offloadable[0].name.as_str(), "unique.uv");
    }

    #[tokio::test]
    async fn register_instance_is_idempotent() {
        let catalog = InMemoryCatalog::new();
        let file = sample_file("x.uv", 1, "correlator");
        catalog.create_file(&file).await.unwrap();
        let instance = FileInstance {
            store_id: StoreId(1),
            parent_dirs: "data".into(),
            name: file.name.clone(),
            deletion_policy: DeletionPolicy::Allowed,
        };
        assert!(catalog.register_instance(&instance).await.unwrap());
        assert!(!catalog.register_instance(&instance).await.unwrap());
    }
}
