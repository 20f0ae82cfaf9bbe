use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::KeyEvent;
use tokio::sync::mpsc;

use crate::api::store::GraphStore;
use crate::api::types::NodeId;
use crate::config::SyncConfig;
use crate::error::{OutlineError, Result, SyncIssue};
use crate::keys::KeybindingMap;
use crate::outline::{flatten, Action, BlockView, Editor, Effect, Gesture, Outcome, Outline};
use crate::sync::{find_backlinks, get_or_create_by_title, BacklinkScope, Backlinks, Debouncer};
use crate::sync::{write_value, ReferenceTracker};

/// Debounce key: which field of which node needs persisting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WriteKey {
    Value(NodeId),
    Structure(NodeId),
}

impl WriteKey {
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Value(id) | Self::Structure(id) => id,
        }
    }

    fn with_node(&self, node_id: NodeId) -> Self {
        match self {
            Self::Value(_) => Self::Value(node_id),
            Self::Structure(_) => Self::Structure(node_id),
        }
    }
}

#[derive(Debug)]
pub enum SessionMessage {
    NodeCreated { placeholder: NodeId, node_id: NodeId },
    CreateFailed { placeholder: NodeId, issue: SyncIssue },
    WriteDue { key: WriteKey, generation: u64 },
    /// `key` is `None` for deletes, which are never coalesced.
    WriteDone { key: Option<WriteKey> },
    WriteFailed { key: Option<WriteKey>, issue: SyncIssue },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Saved,
    Pending(usize),
    Failed(SyncIssue),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub debounce: Duration,
    pub backlinks: BacklinkScope,
    pub close_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SessionOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            backlinks: config.backlinks,
            close_timeout: Duration::from_millis(config.close_timeout_ms),
        }
    }
}

/// One open page and the single dispatch point for its outline. Every edit
/// and every store result goes through `&mut self`; store work runs on
/// spawned tasks that report back over a channel the shell drains with
/// [`PageSession::next_message`] or [`PageSession::process_pending`].
pub struct PageSession {
    store: Arc<dyn GraphStore>,
    title: Option<String>,
    editor: Editor,
    options: SessionOptions,
    debouncer: Debouncer<WriteKey>,
    tracker: ReferenceTracker,
    tx: mpsc::UnboundedSender<SessionMessage>,
    rx: mpsc::UnboundedReceiver<SessionMessage>,
    /// Placeholders whose creation request is in flight.
    creating: HashSet<NodeId>,
    /// Placeholders whose parent is itself still a placeholder.
    waiting_creates: Vec<NodeId>,
    /// Placeholders deleted before the store assigned them an id.
    orphaned: HashSet<NodeId>,
    resolved: HashMap<NodeId, NodeId>,
    deferred: Vec<WriteKey>,
    /// Keys with a store write running. At most one per key.
    writing: HashSet<WriteKey>,
    /// Keys that came due while their previous write was still running.
    dirty: HashSet<WriteKey>,
    in_flight: usize,
    /// Unacknowledged failures, oldest first. A keyed entry clears once a
    /// later write for the same key succeeds.
    failures: Vec<(Option<WriteKey>, SyncIssue)>,
}

impl PageSession {
    /// Fetches and flattens the subtree under `root_id`. A page or block with
    /// no children gets one empty block, created in the store before this
    /// returns. Focus starts on the last block.
    pub async fn open(
        store: Arc<dyn GraphStore>,
        root_id: NodeId,
        options: SessionOptions,
    ) -> Result<Self> {
        let root = store.fetch_subtree(&root_id).await?;
        let blocks = flatten(&root);
        tracing::info!(root = %root_id, blocks = blocks.len(), "page opened");

        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = ReferenceTracker::new();
        tracker.seed(&blocks);
        let mut session = Self {
            store,
            title: root.title.clone(),
            editor: Editor::new(Outline::new(root_id.clone())),
            debouncer: Debouncer::new(options.debounce),
            options,
            tracker,
            tx,
            rx,
            creating: HashSet::new(),
            waiting_creates: Vec::new(),
            orphaned: HashSet::new(),
            resolved: HashMap::new(),
            deferred: Vec::new(),
            writing: HashSet::new(),
            dirty: HashSet::new(),
            in_flight: 0,
            failures: Vec::new(),
        };

        if blocks.is_empty() {
            let position = session.editor.first_position();
            let node_id = session.store.create_node(&root_id, position).await?;
            session
                .editor
                .dispatch(Action::AddBlock { node_id, position })?;
        } else {
            let last = blocks.len() - 1;
            session.editor.dispatch(Action::SetList { list: blocks })?;
            session.editor.dispatch(Action::SetActive { index: last })?;
        }
        Ok(session)
    }

    pub async fn open_by_title(
        store: Arc<dyn GraphStore>,
        title: &str,
        options: SessionOptions,
    ) -> Result<Self> {
        let page_id = get_or_create_by_title(store.as_ref(), title).await?;
        Self::open(store, page_id, options).await
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn outline(&self) -> &Outline {
        self.editor.outline()
    }

    pub fn views(&self) -> Vec<BlockView> {
        self.editor.outline().views()
    }

    /// Returns true when the key was bound and the gesture applied. Unbound
    /// keys and gestures that do not apply are left to the shell.
    pub fn handle_key(&mut self, keymap: &KeybindingMap, key: &KeyEvent) -> Result<bool> {
        match keymap.resolve(key) {
            Some(gesture) => Ok(matches!(self.apply_gesture(gesture)?, Outcome::Applied(_))),
            None => Ok(false),
        }
    }

    pub fn apply_gesture(&mut self, gesture: Gesture) -> Result<Outcome> {
        let outcome = self.editor.handle(gesture)?;
        if let Outcome::Applied(effects) = &outcome {
            for effect in effects {
                self.run_effect(effect.clone());
            }
        }
        Ok(outcome)
    }

    pub fn edit_value(&mut self, index: usize, value: String) -> Result<()> {
        for effect in self.editor.edit_value(index, value)? {
            self.run_effect(effect);
        }
        Ok(())
    }

    pub fn focus(&mut self, index: usize) -> Result<()> {
        self.editor.focus(index)
    }

    /// Backlinks of the open page.
    pub async fn references(&self) -> Result<Backlinks> {
        self.block_references(self.outline().page_id()).await
    }

    pub async fn block_references(&self, node_id: &NodeId) -> Result<Backlinks> {
        find_backlinks(self.store.as_ref(), node_id, self.options.backlinks).await
    }

    pub fn status(&self) -> SyncStatus {
        if let Some((_, issue)) = self.failures.last() {
            return SyncStatus::Failed(issue.clone());
        }
        let pending = self.debouncer.pending()
            + self.deferred.len()
            + self.dirty.len()
            + self.waiting_creates.len()
            + self.creating.len()
            + self.in_flight;
        if pending == 0 {
            SyncStatus::Saved
        } else {
            SyncStatus::Pending(pending)
        }
    }

    /// Dismisses reported failures. Nothing is retried.
    pub fn acknowledge_failures(&mut self) {
        self.failures.clear();
    }

    /// Waits for the next store result or timer and applies it.
    pub async fn next_message(&mut self) -> Result<()> {
        if let Some(message) = self.rx.recv().await {
            self.handle_message(message)?;
        }
        Ok(())
    }

    /// Applies every message already queued without waiting.
    pub fn process_pending(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message)?;
            count += 1;
        }
        Ok(count)
    }

    /// Flushes every write still waiting on a timer, then waits up to the
    /// close timeout for in-flight creations and writes to land.
    pub async fn close(mut self) -> Result<SyncStatus> {
        for key in self.debouncer.drain() {
            self.flush(key);
        }

        let timeout = self.options.close_timeout;
        let settled = tokio::time::timeout(timeout, async {
            while self.in_flight > 0 || !self.creating.is_empty() {
                match self.rx.recv().await {
                    Some(message) => self.handle_message(message)?,
                    None => break,
                }
            }
            Ok::<(), OutlineError>(())
        })
        .await;

        match settled {
            Ok(result) => result?,
            Err(_) => tracing::warn!(
                in_flight = self.in_flight,
                creating = self.creating.len(),
                "page closed with store work still outstanding"
            ),
        }
        let status = self.status();
        tracing::info!(root = %self.outline().page_id(), ?status, "page closed");
        Ok(status)
    }

    fn handle_message(&mut self, message: SessionMessage) -> Result<()> {
        match message {
            SessionMessage::NodeCreated {
                placeholder,
                node_id,
            } => self.resolve_placeholder(placeholder, node_id)?,
            SessionMessage::CreateFailed { placeholder, issue } => {
                self.creating.remove(&placeholder);
                self.orphaned.remove(&placeholder);
                self.deferred.retain(|key| key.node_id() != &placeholder);
                self.failures.push((None, issue));
            }
            SessionMessage::WriteDue { key, generation } => {
                if self.debouncer.complete(&key, generation) {
                    self.flush(key);
                }
            }
            SessionMessage::WriteDone { key } => {
                if let Some(key) = &key {
                    self.failures.retain(|(failed, _)| failed.as_ref() != Some(key));
                }
                self.write_finished(key);
            }
            SessionMessage::WriteFailed { key, issue } => {
                if let Some(key) = &key {
                    self.failures.retain(|(failed, _)| failed.as_ref() != Some(key));
                }
                self.failures.push((key.clone(), issue));
                self.write_finished(key);
            }
        }
        Ok(())
    }

    fn write_finished(&mut self, key: Option<WriteKey>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Some(key) = key else {
            return;
        };
        self.writing.remove(&key);
        if self.dirty.remove(&key) {
            self.flush(key);
        }
    }

    fn resolve_placeholder(&mut self, placeholder: NodeId, node_id: NodeId) -> Result<()> {
        self.creating.remove(&placeholder);
        self.resolved.insert(placeholder.clone(), node_id.clone());

        if self.orphaned.remove(&placeholder) {
            tracing::debug!(node = %node_id, "deleting block removed before creation finished");
            self.spawn_delete(node_id);
            return Ok(());
        }

        self.editor.dispatch(Action::ResolveId {
            placeholder: placeholder.clone(),
            node_id: node_id.clone(),
        })?;
        self.tracker.rename(&placeholder, &node_id);
        for key in [
            WriteKey::Value(placeholder.clone()),
            WriteKey::Structure(placeholder.clone()),
        ] {
            if self.debouncer.cancel(&key) {
                self.schedule(key.with_node(node_id.clone()));
            }
        }

        for waiting in std::mem::take(&mut self.waiting_creates) {
            self.request_create(waiting);
        }
        for key in std::mem::take(&mut self.deferred) {
            self.flush(key);
        }
        Ok(())
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::CreateNode { placeholder, .. } => self.request_create(placeholder),
            Effect::DeleteNode { node_id } => self.request_delete(node_id),
            Effect::PersistValue { node_id } => self.schedule(WriteKey::Value(node_id)),
            Effect::PersistStructure { node_id } => self.schedule(WriteKey::Structure(node_id)),
        }
    }

    fn schedule(&mut self, key: WriteKey) {
        self.debouncer
            .schedule(key, &self.tx, |key, generation| SessionMessage::WriteDue {
                key,
                generation,
            });
    }

    fn current_id(&self, id: &NodeId) -> NodeId {
        self.resolved.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    fn request_create(&mut self, placeholder: NodeId) {
        let Some(index) = self.outline().index_of(&placeholder) else {
            return;
        };
        let block = &self.outline().blocks()[index];
        if block.parent_id.is_placeholder() {
            self.waiting_creates.push(placeholder);
            return;
        }
        let (parent_id, position) = (block.parent_id.clone(), block.position);

        self.creating.insert(placeholder.clone());
        let store = self.store.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let message = match store.create_node(&parent_id, position).await {
                Ok(node_id) => SessionMessage::NodeCreated {
                    placeholder,
                    node_id,
                },
                Err(e) => {
                    tracing::warn!(parent = %parent_id, error = %e, "node creation failed");
                    SessionMessage::CreateFailed {
                        placeholder,
                        issue: SyncIssue::from_error(&e),
                    }
                }
            };
            let _ = tx.send(message);
        });
    }

    fn request_delete(&mut self, node_id: NodeId) {
        for key in [
            WriteKey::Value(node_id.clone()),
            WriteKey::Structure(node_id.clone()),
        ] {
            self.debouncer.cancel(&key);
        }
        self.deferred.retain(|key| key.node_id() != &node_id);
        self.dirty.retain(|key| key.node_id() != &node_id);
        self.tracker.forget(&node_id);

        if !node_id.is_placeholder() {
            self.spawn_delete(node_id);
        } else if self.creating.contains(&node_id) {
            self.orphaned.insert(node_id);
        } else {
            self.waiting_creates.retain(|id| id != &node_id);
        }
    }

    fn spawn_delete(&mut self, node_id: NodeId) {
        let store = self.store.clone();
        let id = node_id.clone();
        self.spawn_write("delete", node_id, None, async move {
            store.delete_node(&id).await
        });
    }

    /// Starts the store write for `key` from the block's current state, or
    /// parks it until the placeholders it mentions are resolved.
    fn flush(&mut self, key: WriteKey) {
        let key = key.with_node(self.current_id(key.node_id()));
        let Some(index) = self.outline().index_of(key.node_id()) else {
            tracing::debug!(?key, "write target no longer on the page");
            return;
        };
        let block = &self.outline().blocks()[index];
        let blocked = block.node_id.is_placeholder()
            || (matches!(key, WriteKey::Structure(_)) && block.parent_id.is_placeholder());
        if blocked {
            if !self.deferred.contains(&key) {
                self.deferred.push(key);
            }
            return;
        }
        if self.writing.contains(&key) {
            // Picked up from the block's state once the running write lands.
            self.dirty.insert(key);
            return;
        }

        let store = self.store.clone();
        let node_id = block.node_id.clone();
        match key {
            WriteKey::Value(_) => {
                let value = block.value.clone();
                let tracker = self.tracker.clone();
                let id = node_id.clone();
                self.spawn_write("value write", node_id, Some(key), async move {
                    write_value(store.as_ref(), &tracker, &id, &value).await
                });
            }
            WriteKey::Structure(_) => {
                let (parent_id, position) = (block.parent_id.clone(), block.position);
                let id = node_id.clone();
                self.spawn_write("structure write", node_id, Some(key), async move {
                    store.set_parent(&id, &parent_id).await?;
                    store.set_position(&id, position).await
                });
            }
        }
    }

    /// Fire-and-forget store write. Failures are logged and surface only
    /// through [`SyncStatus::Failed`]; the outline is not rolled back.
    fn spawn_write<F>(
        &mut self,
        what: &'static str,
        node_id: NodeId,
        key: Option<WriteKey>,
        write: F,
    ) where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.in_flight += 1;
        if let Some(key) = &key {
            self.writing.insert(key.clone());
        }
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let message = match write.await {
                Ok(()) => SessionMessage::WriteDone { key },
                Err(e) => {
                    tracing::warn!(node = %node_id, error = %e, "{} failed", what);
                    SessionMessage::WriteFailed {
                        key,
                        issue: SyncIssue::from_error(&e),
                    }
                }
            };
            let _ = tx.send(message);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingStore;
    use crossterm::event::{KeyCode, KeyModifiers};

    fn options() -> SessionOptions {
        SessionOptions {
            debounce: Duration::from_millis(300),
            backlinks: BacklinkScope::Direct,
            close_timeout: Duration::from_secs(5),
        }
    }

    async fn settle(session: &mut PageSession) {
        while matches!(session.status(), SyncStatus::Pending(_)) {
            session.next_message().await.unwrap();
        }
    }

    async fn seeded(values: &[&str]) -> (Arc<RecordingStore>, NodeId, Vec<NodeId>) {
        let store = Arc::new(RecordingStore::new());
        let page = store.inner.create_page("Inbox").await.unwrap();
        let ids = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                store
                    .inner
                    .insert_block(&page, v, (i + 1) as f64 * 100.0, &[])
                    .unwrap()
            })
            .collect();
        store.clear();
        (store, page, ids)
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_materializes_one_active_block() {
        let (store, page, _) = seeded(&[]).await;
        let session = PageSession::open(store.clone(), page.clone(), options())
            .await
            .unwrap();

        let views = session.views();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].depth, 0);
        assert!(views[0].is_active);
        assert!(!views[0].id.is_placeholder());
        assert_eq!(store.inner.parent_of(&views[0].id), Some(page));
        assert_eq!(session.status(), SyncStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn loaded_page_focuses_last_block() {
        let (store, page, ids) = seeded(&["one", "two", "three"]).await;
        let session = PageSession::open(store, page, options()).await.unwrap();
        assert_eq!(session.outline().active().unwrap().node_id, ids[2]);
        assert_eq!(session.title(), Some("Inbox"));
    }

    #[tokio::test(start_paused = true)]
    async fn open_by_title_creates_missing_page() {
        let store = Arc::new(RecordingStore::new());
        let session = PageSession::open_by_title(store.clone(), "Fresh", options())
            .await
            .unwrap();
        assert_eq!(session.title(), Some("Fresh"));
        assert_eq!(session.views().len(), 1);
        assert_eq!(store.calls_named("create_page").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_coalesces_into_one_value_write() {
        let (store, page, ids) = seeded(&[""]).await;
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        for text in ["h", "he", "hel", "hell", "hello"] {
            session.edit_value(0, text.into()).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(store.calls_named("set_value").is_empty());

        settle(&mut session).await;
        assert_eq!(
            store.calls_named("set_value"),
            vec![format!("set_value {} hello", ids[0])]
        );
        assert_eq!(session.status(), SyncStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn value_write_diffs_references() {
        let (store, page, ids) = seeded(&[""]).await;
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        session.edit_value(0, "[[Ada]] and [[Bob]]".into()).unwrap();
        settle(&mut session).await;
        assert_eq!(store.inner.references_of(&ids[0]).len(), 2);

        store.clear();
        session.edit_value(0, "[[Bob]] and [[Cy]]".into()).unwrap();
        settle(&mut session).await;
        assert_eq!(store.calls_named("set_references").len(), 1);
        assert_eq!(store.calls_named("remove_references").len(), 1);
        assert_eq!(store.inner.references_of(&ids[0]).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn split_resolves_placeholder_to_store_id() {
        let (store, page, _) = seeded(&["first"]).await;
        let mut session = PageSession::open(store.clone(), page.clone(), options())
            .await
            .unwrap();

        session.apply_gesture(Gesture::Split).unwrap();
        let placeholder = session.outline().active().unwrap().node_id.clone();
        assert!(placeholder.is_placeholder());
        assert_eq!(session.status(), SyncStatus::Pending(1));

        settle(&mut session).await;
        let resolved = session.outline().active().unwrap().node_id.clone();
        assert!(!resolved.is_placeholder());
        assert!(store.inner.contains(&resolved));
        assert_eq!(store.inner.parent_of(&resolved), Some(page));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_to_unresolved_block_wait_for_its_id() {
        let (store, page, _) = seeded(&["first"]).await;
        store.delay_creates(Duration::from_secs(2));
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        session.apply_gesture(Gesture::Split).unwrap();
        session.edit_value(1, "typed early".into()).unwrap();
        settle(&mut session).await;

        let id = session.outline().blocks()[1].node_id.clone();
        assert!(!id.is_placeholder());
        assert_eq!(store.inner.value_of(&id).as_deref(), Some("typed early"));
        let writes = store.calls_named("set_value");
        assert_eq!(writes, vec![format!("set_value {} typed early", id)]);
    }

    #[tokio::test(start_paused = true)]
    async fn split_then_indent_before_creation_persists_final_parent() {
        let (store, page, ids) = seeded(&["first"]).await;
        store.delay_creates(Duration::from_secs(1));
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        session.apply_gesture(Gesture::Split).unwrap();
        session.apply_gesture(Gesture::Indent).unwrap();
        settle(&mut session).await;

        let id = session.outline().blocks()[1].node_id.clone();
        assert_eq!(store.inner.parent_of(&id), Some(ids[0].clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn merge_delete_removes_node_from_store() {
        let (store, page, ids) = seeded(&["keep", ""]).await;
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        session.apply_gesture(Gesture::MergeDelete).unwrap();
        settle(&mut session).await;
        assert_eq!(session.views().len(), 1);
        assert!(session.views()[0].is_active);
        assert!(!store.inner.contains(&ids[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_unresolved_block_deletes_it_once_created() {
        let (store, page, _) = seeded(&["keep"]).await;
        store.delay_creates(Duration::from_secs(1));
        let mut session = PageSession::open(store.clone(), page.clone(), options())
            .await
            .unwrap();

        session.apply_gesture(Gesture::Split).unwrap();
        session.apply_gesture(Gesture::MergeDelete).unwrap();
        settle(&mut session).await;

        assert_eq!(session.views().len(), 1);
        assert_eq!(store.calls_named("delete_node").len(), 1);
        let tree = store.inner.fetch_subtree(&page).await.unwrap();
        assert_eq!(tree.children.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn indent_persists_parent_and_position() {
        let (store, page, ids) = seeded(&["a", "b"]).await;
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        session.apply_gesture(Gesture::Indent).unwrap();
        settle(&mut session).await;
        assert_eq!(store.inner.parent_of(&ids[1]), Some(ids[0].clone()));
        assert_eq!(store.calls_named("set_position").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_keeps_edit_and_reports_status() {
        let (store, page, _) = seeded(&[""]).await;
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        store.fail_writes(true);
        session.edit_value(0, "offline".into()).unwrap();
        settle(&mut session).await;

        assert_eq!(session.views()[0].value, "offline");
        match session.status() {
            SyncStatus::Failed(issue) => assert_eq!(issue.title, "Store Unreachable"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn later_success_clears_failure_for_same_block() {
        let (store, page, ids) = seeded(&[""]).await;
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        store.fail_writes(true);
        session.edit_value(0, "offline".into()).unwrap();
        settle(&mut session).await;
        assert!(matches!(session.status(), SyncStatus::Failed(_)));

        store.fail_writes(false);
        session.edit_value(0, "back online".into()).unwrap();
        settle(&mut session).await;
        assert_eq!(session.status(), SyncStatus::Saved);
        assert_eq!(store.inner.value_of(&ids[0]).as_deref(), Some("back online"));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_of_another_block_stays_until_acknowledged() {
        let (store, page, _) = seeded(&["", ""]).await;
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        store.fail_writes(true);
        session.edit_value(0, "lost".into()).unwrap();
        settle(&mut session).await;

        store.fail_writes(false);
        session.edit_value(1, "kept".into()).unwrap();
        settle(&mut session).await;
        assert!(matches!(session.status(), SyncStatus::Failed(_)));

        session.acknowledge_failures();
        assert_eq!(session.status(), SyncStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn value_writes_to_one_block_never_overlap() {
        let (store, page, ids) = seeded(&[""]).await;
        store.delay_value("old", Duration::from_secs(1));
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        session.edit_value(0, "old".into()).unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        session.process_pending().unwrap();

        session.edit_value(0, "new".into()).unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        session.process_pending().unwrap();
        // "old" is still being written, so "new" waits for it.
        assert_eq!(
            store.calls_named("set_value"),
            vec![format!("set_value {} old", ids[0])]
        );
        assert!(matches!(session.status(), SyncStatus::Pending(_)));

        settle(&mut session).await;
        assert_eq!(
            store.calls_named("set_value"),
            vec![
                format!("set_value {} old", ids[0]),
                format!("set_value {} new", ids[0]),
            ]
        );
        assert_eq!(store.inner.value_of(&ids[0]).as_deref(), Some("new"));
        assert_eq!(session.status(), SyncStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn close_flushes_pending_writes() {
        let (store, page, ids) = seeded(&[""]).await;
        let mut session = PageSession::open(store.clone(), page, options()).await.unwrap();

        session.edit_value(0, "last words".into()).unwrap();
        let status = session.close().await.unwrap();

        assert_eq!(status, SyncStatus::Saved);
        assert_eq!(store.inner.value_of(&ids[0]).as_deref(), Some("last words"));
    }

    #[tokio::test(start_paused = true)]
    async fn handle_key_routes_through_keymap() {
        let (store, page, _) = seeded(&["a", "b"]).await;
        let mut session = PageSession::open(store, page, options()).await.unwrap();
        let keymap = KeybindingMap::from_preset("default", &HashMap::new()).unwrap();

        let up = KeyEvent::new(KeyCode::Up, KeyModifiers::NONE);
        assert!(session.handle_key(&keymap, &up).unwrap());
        assert_eq!(session.outline().active_index(), Some(0));

        let letter = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE);
        assert!(!session.handle_key(&keymap, &letter).unwrap());

        // Backspace on a non-empty block falls through to text editing.
        let backspace = KeyEvent::new(KeyCode::Backspace, KeyModifiers::NONE);
        assert!(!session.handle_key(&keymap, &backspace).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn references_group_backlinks_of_open_page() {
        let store = Arc::new(RecordingStore::new());
        let topic = store.inner.create_page("Topic").await.unwrap();
        let journal = store.inner.create_page("Journal").await.unwrap();
        store
            .inner
            .insert_block(&journal, "[[Topic]]", 1.0, &[topic.clone()])
            .unwrap();

        let session = PageSession::open(store, topic, options()).await.unwrap();
        let links = session.references().await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[&journal].page_title, "Journal");
    }
}
