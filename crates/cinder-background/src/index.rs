//! The background indexer itself.
//!
//! Data flow: a compilation-database change enqueues a Normal-priority
//! load-shards pass, which loads cached shards, decides which translation
//! units are stale, and enqueues one Background-priority indexing task per
//! stale TU. Indexing a TU partitions its results across per-file shards,
//! persists them, and refreshes the published index.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cinder_core::FileDigest;
use cinder_core::SymbolId;
use cinder_index::{DuplicateHandling, FileSymbols, IndexSnapshot, IndexType, SwapIndex};
use cinder_project::{CompilationDatabase, CompileCommand};
use cinder_store::{digest_bytes, digest_file, Shard, ShardStorage, ShardStorageFactory};
use cinder_symbols::{
    IncludeGraph, Ref, RefSlab, Relation, RelationSlab, SourceFlags, SymbolSlab,
};
use cinder_vfs::FileSystem;
use rand::seq::SliceRandom;

use crate::parser::{ParseError, ParseInputs, TuParser};
use crate::queue::{TaskPriority, TaskQueue};
use crate::thread_priority::{set_current_thread_priority, starvation_prevented, ThreadPriority};
use crate::uri_cache::UriToPathCache;

/// Knobs for the background indexer.
#[derive(Clone, Debug)]
pub struct BackgroundIndexConfig {
    /// Number of worker threads. At least one.
    pub thread_pool_size: usize,
    /// If set, a dedicated thread rebuilds the published index on this
    /// period; if unset, every indexed TU triggers an immediate cheap
    /// rebuild.
    pub build_index_period: Option<Duration>,
}

impl Default for BackgroundIndexConfig {
    fn default() -> Self {
        let available = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            // Leave a core for interactive work; containers can report the
            // host CPU count, so cap the default.
            thread_pool_size: available.saturating_sub(1).clamp(1, 8),
            build_index_period: None,
        }
    }
}

/// The digest the shard store holds for one file, plus whether that indexing
/// pass saw uncompilable errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardVersion {
    pub digest: FileDigest,
    pub had_errors: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Long-running service keeping a symbol index fresh for a source tree.
///
/// Dropping the service stops it: queued tasks are discarded, in-flight tasks
/// run to completion, and all threads are joined.
pub struct BackgroundIndex {
    inner: Arc<IndexInner>,
    workers: Vec<JoinHandle<()>>,
    rebuilder: Option<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
    watch_stop: Option<crossbeam_channel::Sender<()>>,
}

struct IndexInner {
    fs: Arc<dyn FileSystem>,
    database: Arc<dyn CompilationDatabase>,
    parser: Arc<dyn TuParser>,
    storage_factory: ShardStorageFactory,
    build_index_period: Option<Duration>,

    queue: TaskQueue,
    rebuild_stop: Mutex<bool>,
    rebuild_cv: Condvar,
    symbols_updated: AtomicBool,

    shard_versions: Mutex<HashMap<PathBuf, ShardVersion>>,
    file_symbols: FileSymbols,
    index: SwapIndex,
}

impl BackgroundIndex {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        database: Arc<dyn CompilationDatabase>,
        parser: Arc<dyn TuParser>,
        storage_factory: ShardStorageFactory,
        config: BackgroundIndexConfig,
    ) -> Self {
        let commands_rx = database.watch();

        let inner = Arc::new(IndexInner {
            fs,
            database,
            parser,
            storage_factory,
            build_index_period: config.build_index_period,
            queue: TaskQueue::new(),
            rebuild_stop: Mutex::new(false),
            rebuild_cv: Condvar::new(),
            symbols_updated: AtomicBool::new(false),
            shard_versions: Mutex::new(HashMap::new()),
            file_symbols: FileSymbols::new(),
            index: SwapIndex::default(),
        });

        let mut workers = Vec::new();
        for i in 0..config.thread_pool_size.max(1) {
            let worker_inner = Arc::clone(&inner);
            match thread::Builder::new()
                .name(format!("cinder-worker-{i}"))
                .spawn(move || worker_loop(worker_inner))
            {
                Ok(handle) => workers.push(handle),
                Err(err) => tracing::warn!(
                    target = "cinder.background",
                    error = %err,
                    "failed to spawn background worker"
                ),
            }
        }
        if workers.is_empty() {
            panic!("failed to spawn any background worker thread");
        }

        let rebuilder = config.build_index_period.and_then(|period| {
            tracing::info!(
                target = "cinder.background",
                period_ms = period.as_millis() as u64,
                "building symbol index periodically"
            );
            let rebuild_inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("cinder-index-builder".to_string())
                .spawn(move || rebuild_loop(rebuild_inner, period))
                .map_err(|err| {
                    tracing::error!(
                        target = "cinder.background",
                        error = %err,
                        "failed to spawn periodic index builder"
                    );
                })
                .ok()
        });

        let (watch_stop_tx, watch_stop_rx) = crossbeam_channel::bounded::<()>(0);
        let watch_inner = Arc::clone(&inner);
        let watcher = thread::Builder::new()
            .name("cinder-db-watcher".to_string())
            .spawn(move || loop {
                crossbeam_channel::select! {
                    recv(commands_rx) -> message => match message {
                        Ok(files) => enqueue_changed(&watch_inner, files),
                        Err(_) => break,
                    },
                    recv(watch_stop_rx) -> _ => break,
                }
            })
            .map_err(|err| {
                tracing::warn!(
                    target = "cinder.background",
                    error = %err,
                    "failed to spawn compilation database watcher"
                );
            })
            .ok();

        Self {
            inner,
            workers,
            rebuilder,
            watcher,
            watch_stop: Some(watch_stop_tx),
        }
    }

    /// Schedules a load-shards pass for `files` at Normal priority; stale
    /// translation units discovered by the pass are then indexed at
    /// Background priority.
    pub fn enqueue_changed(&self, files: Vec<PathBuf>) {
        enqueue_changed(&self.inner, files);
    }

    /// Schedules indexing of a single translation unit. Internal plumbing,
    /// exposed for the load-shards pass and for tests.
    pub fn enqueue_compile(&self, command: CompileCommand, storage: Arc<dyn ShardStorage>) {
        enqueue_compile(&self.inner, command, storage);
    }

    /// A handle to the currently published index generation.
    pub fn index(&self) -> IndexSnapshot {
        self.inner.index.snapshot()
    }

    pub fn estimate_memory_usage(&self) -> usize {
        self.inner.index.estimate_memory_usage()
    }

    /// Test hook: waits until the queue is drained and no task is running.
    pub fn block_until_idle(&self, timeout: Option<Duration>) -> bool {
        self.inner.queue.block_until_idle(timeout)
    }

    /// Begins shutdown: queued tasks are discarded, workers and the
    /// rebuilder exit after their current iteration.
    pub fn stop(&self) {
        {
            let mut queue_state = self
                .inner
                .queue
                .state
                .lock()
                .expect("task queue mutex poisoned");
            let mut rebuild_stop = self
                .inner
                .rebuild_stop
                .lock()
                .expect("rebuild mutex poisoned");
            queue_state.stopping = true;
            *rebuild_stop = true;
        }
        self.inner.queue.cv.notify_all();
        self.inner.rebuild_cv.notify_all();
    }
}

impl Drop for BackgroundIndex {
    fn drop(&mut self) {
        self.stop();
        // Disconnect the watcher's stop channel so its select wakes up.
        self.watch_stop.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.rebuilder.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.watcher.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inner: Arc<IndexInner>) {
    while let Some((task, priority)) = inner.queue.next() {
        if priority != TaskPriority::Normal && !starvation_prevented() {
            set_current_thread_priority(ThreadPriority::Background);
        }
        task();
        if priority != TaskPriority::Normal {
            set_current_thread_priority(ThreadPriority::Default);
        }
        inner.queue.task_finished();
    }
}

fn rebuild_loop(inner: Arc<IndexInner>, period: Duration) {
    loop {
        {
            let stop = inner.rebuild_stop.lock().expect("rebuild mutex poisoned");
            if *stop {
                break;
            }
            let (stop, _) = inner
                .rebuild_cv
                .wait_timeout(stop, period)
                .expect("rebuild mutex poisoned");
            if *stop {
                break;
            }
        }
        if !inner.symbols_updated.swap(false, Ordering::SeqCst) {
            continue;
        }
        // A symbol update can land between the swap above and the build
        // below; the next cycle then does redundant work, never less.
        let index = inner
            .file_symbols
            .build_index(IndexType::Heavy, DuplicateHandling::Merge);
        tracing::info!(
            target = "cinder.background",
            bytes = index.estimate_memory_usage(),
            "rebuilt symbol index"
        );
        inner.index.reset(index);
    }
}

fn enqueue_changed(inner: &Arc<IndexInner>, files: Vec<PathBuf>) {
    let task_inner = Arc::clone(inner);
    inner.queue.push(
        Box::new(move || {
            tracing::debug!(
                target = "cinder.background",
                files = files.len(),
                "loading shards for changed files"
            );
            let mut stale = load_shards(&task_inner, &files);
            // Spread contention: neighbouring TUs share headers, so indexing
            // them in discovery order would make workers fight over the same
            // shard versions.
            stale.shuffle(&mut rand::thread_rng());
            for (command, storage) in stale {
                enqueue_compile(&task_inner, command, storage);
            }
        }),
        TaskPriority::Normal,
    );
}

fn enqueue_compile(
    inner: &Arc<IndexInner>,
    command: CompileCommand,
    storage: Arc<dyn ShardStorage>,
) {
    let task_inner = Arc::clone(inner);
    inner.queue.push(
        Box::new(move || {
            let file = command.filename.clone();
            if let Err(err) = index_tu(&task_inner, command, &storage) {
                tracing::error!(
                    target = "cinder.background",
                    file = %file.display(),
                    error = %err,
                    "indexing failed"
                );
            }
        }),
        TaskPriority::Background,
    );
}

/// Results of parsing one TU, ready to be partitioned into shards.
struct TuIndex {
    symbols: SymbolSlab,
    refs: RefSlab,
    relations: RelationSlab,
    sources: IncludeGraph,
    command: CompileCommand,
}

fn index_tu(
    inner: &Arc<IndexInner>,
    command: CompileCommand,
    storage: &Arc<dyn ShardStorage>,
) -> Result<(), IndexError> {
    let main_path = command.absolute_main_path();
    let bytes = inner.fs.read_bytes(&main_path)?;
    let main_digest = digest_bytes(&bytes);

    // Snapshot the versions once so per-file skip decisions are stable for
    // the whole TU.
    let snapshot: HashMap<PathBuf, ShardVersion> = inner
        .shard_versions
        .lock()
        .expect("shard versions mutex poisoned")
        .clone();

    tracing::debug!(
        target = "cinder.background",
        file = %main_path.display(),
        digest = %main_digest,
        "indexing translation unit"
    );

    let file_filter = |path: &Path, digest: FileDigest| match snapshot.get(path) {
        Some(version) if version.digest == digest && !version.had_errors => false,
        _ => true,
    };
    let parsed = inner.parser.parse(ParseInputs {
        command: &command,
        fs: &*inner.fs,
        file_filter: &file_filter,
    })?;

    let mut sources = parsed.sources;
    let had_errors = parsed.had_errors;
    if had_errors {
        tracing::warn!(
            target = "cinder.background",
            file = %main_path.display(),
            "translation unit had uncompilable errors; index may be incomplete"
        );
        sources.mark_all(SourceFlags::HAD_ERRORS);
    }
    tracing::debug!(
        target = "cinder.background",
        file = %main_path.display(),
        symbols = parsed.symbols.len(),
        refs = parsed.refs.num_refs(),
        files = sources.len(),
        "indexed translation unit"
    );

    let tu = TuIndex {
        symbols: parsed.symbols,
        refs: parsed.refs,
        relations: parsed.relations,
        sources,
        command,
    };
    update(inner, &main_path, tu, &snapshot, storage.as_ref(), had_errors);

    if inner.build_index_period.is_some() {
        inner.symbols_updated.store(true, Ordering::SeqCst);
    } else {
        // Shards carry fully merged symbol records, so the interim rebuild
        // after each TU can keep the first record per id and skip the merge
        // cost; the next Heavy build reconciles any stale overlap.
        inner.index.reset(
            inner
                .file_symbols
                .build_index(IndexType::Light, DuplicateHandling::PickOne),
        );
    }
    Ok(())
}

/// Transient per-file record sets built while partitioning a TU result.
#[derive(Default)]
struct FilePartition {
    digest: FileDigest,
    node_uri: String,
    symbols: Vec<SymbolId>,
    refs: Vec<(SymbolId, Ref)>,
    relations: Vec<Relation>,
}

/// Splits a TU result across per-file shards, persists the rewritten shards,
/// and installs the new slabs in memory.
///
/// Only files whose stored version differs from the TU's view are rewritten:
/// a file is included if it is unknown, its digest changed, or its previous
/// index was broken while this one is not.
fn update(
    inner: &Arc<IndexInner>,
    main_path: &Path,
    tu: TuIndex,
    snapshot: &HashMap<PathBuf, ShardVersion>,
    storage: &dyn ShardStorage,
    had_errors: bool,
) {
    let mut uri_cache = UriToPathCache::new(main_path.to_path_buf());

    let mut files: HashMap<PathBuf, FilePartition> = HashMap::new();
    for (uri, node) in tu.sources.iter() {
        let Some(abs_path) = uri_cache.resolve(uri) else {
            continue;
        };
        let rewrite = match snapshot.get(&abs_path) {
            None => true,
            Some(version) => {
                version.digest != node.digest || (version.had_errors && !had_errors)
            }
        };
        if rewrite {
            let partition = files.entry(abs_path).or_default();
            partition.digest = node.digest;
            partition.node_uri = uri.clone();
        }
    }

    // Attach symbols to their declaring file's shard; symbols whose
    // definition lives elsewhere are duplicated into the defining file's
    // shard so merging can prefer canonical headers.
    let mut symbol_file: HashMap<SymbolId, PathBuf> = HashMap::new();
    for symbol in tu.symbols.iter() {
        let declaration_uri = symbol
            .canonical_declaration
            .as_ref()
            .map(|location| location.file_uri.as_str());
        if let Some(declaration_uri) = declaration_uri {
            if let Some(declaration_path) = uri_cache.resolve(declaration_uri) {
                if let Some(partition) = files.get_mut(&declaration_path) {
                    partition.symbols.push(symbol.id);
                    symbol_file.insert(symbol.id, declaration_path);
                }
            }
        }
        if let Some(definition) = &symbol.definition {
            if Some(definition.file_uri.as_str()) != declaration_uri {
                if let Some(definition_path) = uri_cache.resolve(&definition.file_uri) {
                    if let Some(partition) = files.get_mut(&definition_path) {
                        partition.symbols.push(symbol.id);
                    }
                }
            }
        }
    }

    for (id, references) in tu.refs.iter() {
        for reference in references {
            let Some(path) = uri_cache.resolve(&reference.location.file_uri) else {
                continue;
            };
            if let Some(partition) = files.get_mut(&path) {
                partition.refs.push((id, reference.clone()));
            }
        }
    }

    // A relation lives in the shard of its subject's declaring file;
    // relations whose subject landed nowhere are dropped.
    for relation in tu.relations.iter() {
        if let Some(path) = symbol_file.get(&relation.subject) {
            if let Some(partition) = files.get_mut(path) {
                partition.relations.push(*relation);
            }
        }
    }

    struct BuiltShard {
        path: PathBuf,
        digest: FileDigest,
        symbols: Arc<SymbolSlab>,
        refs: Arc<RefSlab>,
        relations: Arc<RelationSlab>,
    }

    let mut built = Vec::with_capacity(files.len());
    for (path, partition) in files {
        let mut symbols = SymbolSlab::builder();
        for id in &partition.symbols {
            if let Some(symbol) = tu.symbols.get(*id) {
                symbols.insert(symbol.clone());
            }
        }
        let symbols = symbols.build();

        let mut refs = RefSlab::builder();
        for (id, reference) in partition.refs {
            refs.insert(id, reference);
        }
        let refs = refs.build();

        let mut relations = RelationSlab::builder();
        for relation in partition.relations {
            relations.insert(relation);
        }
        let relations = relations.build();

        let shard = Shard {
            symbols: Some(symbols.clone()),
            refs: Some(refs.clone()),
            relations: Some(relations.clone()),
            sources: Some(tu.sources.sub_graph(&partition.node_uri)),
            // Only the TU main file's shard remembers how to rebuild the TU.
            command: (path == main_path).then(|| tu.command.clone()),
        };
        if let Err(err) = storage.store_shard(&path, &shard) {
            // Queries still see fresh data; only the cache misses out.
            tracing::warn!(
                target = "cinder.background",
                file = %path.display(),
                error = %err,
                "failed to write shard; keeping in-memory update"
            );
        }

        built.push(BuiltShard {
            path,
            digest: partition.digest,
            symbols: Arc::new(symbols),
            refs: Arc::new(refs),
            relations: Arc::new(relations),
        });
    }

    let mut versions = inner
        .shard_versions
        .lock()
        .expect("shard versions mutex poisoned");
    for shard in built {
        use std::collections::hash_map::Entry;
        match versions.entry(shard.path.clone()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                let repairs_broken_shard = current.had_errors && !had_errors;
                // A concurrent thread already recorded this content; its
                // in-memory slabs are equivalent, so the loser skips.
                if current.digest == shard.digest && !repairs_broken_shard {
                    continue;
                }
                entry.insert(ShardVersion {
                    digest: shard.digest,
                    had_errors,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(ShardVersion {
                    digest: shard.digest,
                    had_errors,
                });
            }
        }
        inner.file_symbols.update(
            &shard.path,
            Some(shard.symbols),
            Some(shard.refs),
            Some(shard.relations),
            shard.path == main_path,
        );
    }
}

/// One file reachable from a TU, with the verdict on whether it must be
/// re-indexed.
struct SourceDep {
    path: PathBuf,
    needs_reindexing: bool,
}

/// Walks the stored include graph from a TU's main file, installing every
/// loadable shard and reporting which reachable files are stale.
fn load_shard(
    inner: &Arc<IndexInner>,
    command: &CompileCommand,
    storage: &dyn ShardStorage,
    loaded_shards: &mut HashSet<PathBuf>,
) -> Vec<SourceDep> {
    struct LoadedShardInfo {
        path: PathBuf,
        symbols: Option<SymbolSlab>,
        refs: Option<RefSlab>,
        relations: Option<RelationSlab>,
        digest: FileDigest,
        counts_refs: bool,
        had_errors: bool,
    }

    let main_path = command.absolute_main_path();
    let mut dependencies: Vec<SourceDep> = Vec::new();
    let mut installed: Vec<LoadedShardInfo> = Vec::new();
    let mut in_queue: HashSet<PathBuf> = HashSet::new();
    let mut to_visit: VecDeque<SourceDep> = VecDeque::new();

    // Until its shard is loaded, a dependency counts as needing re-indexing.
    in_queue.insert(main_path.clone());
    to_visit.push_back(SourceDep {
        path: main_path,
        needs_reindexing: true,
    });

    while let Some(mut current) = to_visit.pop_front() {
        // A shard's contents don't change from one TU to another: if an
        // earlier BFS handled this path, it already detected staleness.
        if !loaded_shards.insert(current.path.clone()) {
            current.needs_reindexing = false;
            dependencies.push(current);
            continue;
        }

        let Some(mut shard) = storage.load_shard(&current.path) else {
            tracing::debug!(
                target = "cinder.background",
                file = %current.path.display(),
                "no usable shard; file will be re-indexed"
            );
            dependencies.push(current);
            continue;
        };
        let Some(sources) = shard.sources.take() else {
            dependencies.push(current);
            continue;
        };

        for (uri, node) in sources.iter() {
            let abs_path = match cinder_core::path::file_uri_to_path(uri, &current.path) {
                Ok(path) => path,
                Err(err) => {
                    tracing::debug!(
                        target = "cinder.background",
                        uri,
                        error = %err,
                        "ignoring include-graph edge with bad URI"
                    );
                    continue;
                }
            };
            if in_queue.insert(abs_path.clone()) {
                to_visit.push_back(SourceDep {
                    path: abs_path.clone(),
                    needs_reindexing: true,
                });
            }
            // Nodes other than the shard's own file are just edges.
            if abs_path != current.path {
                continue;
            }

            installed.push(LoadedShardInfo {
                path: current.path.clone(),
                symbols: shard.symbols.take(),
                refs: shard.refs.take(),
                relations: shard.relations.take(),
                digest: node.digest,
                counts_refs: node.flags.contains(SourceFlags::IS_TU),
                had_errors: node.flags.contains(SourceFlags::HAD_ERRORS),
            });

            match digest_file(&*inner.fs, &current.path) {
                Ok(on_disk) => current.needs_reindexing = on_disk != node.digest,
                Err(err) => {
                    tracing::debug!(
                        target = "cinder.background",
                        file = %current.path.display(),
                        error = %err,
                        "couldn't digest file to validate its shard"
                    );
                }
            }
        }
        dependencies.push(current);
    }

    {
        let mut versions = inner
            .shard_versions
            .lock()
            .expect("shard versions mutex poisoned");
        // This can override a newer version added by a concurrent thread that
        // finished first; rare in practice, and the digests converge on the
        // next pass.
        for info in installed {
            versions.insert(
                info.path.clone(),
                ShardVersion {
                    digest: info.digest,
                    had_errors: info.had_errors,
                },
            );
            inner.file_symbols.update(
                &info.path,
                info.symbols.map(Arc::new),
                info.refs.map(Arc::new),
                info.relations.map(Arc::new),
                info.counts_refs,
            );
        }
    }

    dependencies
}

/// Loads cached shards for every changed file and returns the TUs that need
/// re-indexing, then publishes a full rebuild of the index.
fn load_shards(
    inner: &Arc<IndexInner>,
    changed_files: &[PathBuf],
) -> Vec<(CompileCommand, Arc<dyn ShardStorage>)> {
    let mut needs_reindexing: Vec<(CompileCommand, Arc<dyn ShardStorage>)> = Vec::new();
    // Files already covered by a queued TU, to suppress duplicate enqueues.
    let mut files_to_index: HashSet<PathBuf> = HashSet::new();
    // Shards already read in this pass, to avoid redundant disk IO.
    let mut loaded_shards: HashSet<PathBuf> = HashSet::new();

    for file in changed_files {
        let Some((command, project)) = inner.database.compile_command(file) else {
            continue;
        };
        let storage = (inner.storage_factory)(&project.source_root);
        let dependencies = load_shard(inner, &command, storage.as_ref(), &mut loaded_shards);
        for dependency in &dependencies {
            if !dependency.needs_reindexing || files_to_index.contains(&dependency.path) {
                continue;
            }
            tracing::debug!(
                target = "cinder.background",
                tu = %command.filename.display(),
                dependency = %dependency.path.display(),
                "queueing translation unit; dependency needs re-indexing"
            );
            // Re-indexing the TU covers all of its dependencies.
            for dependency in &dependencies {
                files_to_index.insert(dependency.path.clone());
            }
            needs_reindexing.push((command, storage));
            break;
        }
    }

    let index = inner
        .file_symbols
        .build_index(IndexType::Heavy, DuplicateHandling::Merge);
    tracing::info!(
        target = "cinder.background",
        bytes = index.estimate_memory_usage(),
        "loaded all shards and built symbol index"
    );
    inner.index.reset(index);

    needs_reindexing
}
