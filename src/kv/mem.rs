//! # In-Memory KV Engine
//!
//! A self-contained implementation of the KV contract: named sub-DBs held
//! as sorted entry vectors, MVCC through per-transaction snapshots of
//! refcounted trees, and a single serialized writer.
//!
//! ## Concurrency model
//!
//! - Readers snapshot every sub-DB's tree `Arc` at `begin_read` and never
//!   block; any number may run on parallel threads.
//! - `begin_write` takes the database-wide writer mutex (held for the
//!   transaction's lifetime via an owning guard) and snapshots after
//!   acquiring it, so the writer always starts from the latest published
//!   state.
//! - A write transaction mutates copy-on-write clones of the snapshot
//!   trees; `commit` publishes the touched trees back, `abort` (or drop)
//!   discards them.
//!
//! A transaction is single-threaded by construction: its internal state
//! lives in `RefCell`/`Cell`, which keeps `Txn: !Sync`; the compiler
//! enforces the one-thread-at-a-time rule of the scheduling model.
//!
//! ## Cursor semantics
//!
//! [`RawCursor`] mirrors the positioning behavior the cursor engine relies
//! on: cursors stay valid across mutations in the same transaction
//! (revalidating against the tree generation and re-resolving their stored
//! position), a delete leaves the cursor on the successor entry, `prev`
//! from the end-of-data state lands on the last entry, and the `on_first`
//! / `on_last` / `eof` predicates report physical position.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex, RwLock};
use smallvec::{smallvec, SmallVec};

use crate::config::CoreConfig;
use crate::errors::{fault, ErrorKind};
use crate::kv::{buf, Buf, KeyCmp, PutFlags, SeekOp, SubDbFlags};

/// Handle of an open sub-DB, stable for the life of the [`Db`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dbi(u32);

impl Dbi {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) key: Buf,
    pub(crate) vals: SmallVec<[Buf; 1]>,
}

pub(crate) type Tree = Vec<Entry>;

struct SubDbCore {
    name: String,
    flags: SubDbFlags,
    key_cmp: KeyCmp,
    dup_cmp: KeyCmp,
    tree: RwLock<Arc<Tree>>,
}

struct DbCore {
    catalog: RwLock<HashMap<String, Dbi>>,
    subdbs: RwLock<Vec<Arc<SubDbCore>>>,
    writer: Arc<Mutex<()>>,
    txn_ids: AtomicU64,
    config: CoreConfig,
}

/// The in-memory database: sub-DBs, the writer lock, and the engine
/// configuration.
#[derive(Clone)]
pub struct Db {
    core: Arc<DbCore>,
}

impl Db {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        Self {
            core: Arc::new(DbCore {
                catalog: RwLock::new(HashMap::new()),
                subdbs: RwLock::new(Vec::new()),
                writer: Arc::new(Mutex::new(())),
                txn_ids: AtomicU64::new(1),
                config,
            }),
        }
    }

    pub fn builder() -> DbBuilder {
        DbBuilder::default()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.core.config
    }

    /// Starts a read transaction over a consistent snapshot.
    pub fn begin_read(&self) -> Txn {
        Txn::begin(self.core.clone(), None)
    }

    /// Starts the (single) write transaction, blocking until the writer
    /// lock is available.
    pub fn begin_write(&self) -> Txn {
        let guard = Mutex::lock_arc(&self.core.writer);
        Txn::begin(self.core.clone(), Some(guard))
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder applying [`CoreConfig`] options before the database opens.
#[derive(Debug, Default)]
pub struct DbBuilder {
    config: CoreConfig,
}

impl DbBuilder {
    pub fn prohibit_nearby_for_unordered(mut self, on: bool) -> Self {
        self.config.prohibit_nearby_for_unordered = on;
        self
    }

    pub fn prohibit_loss_of_precision(mut self, on: bool) -> Self {
        self.config.prohibit_loss_of_precision = on;
        self
    }

    pub fn enable_return_into_range(mut self, on: bool) -> Self {
        self.config.enable_return_into_range = on;
        self
    }

    pub fn build(self) -> Db {
        Db::with_config(self.config)
    }
}

struct Slot {
    tree: Arc<Tree>,
    dirty: bool,
    gen: u64,
}

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    ReadOnly,
    ReadWrite,
}

/// A transaction: a snapshot of every sub-DB, plus (for writers) the
/// copy-on-write working trees and the owning writer-lock guard.
pub struct Txn {
    core: Arc<DbCore>,
    id: u64,
    mode: TxnMode,
    slots: RefCell<Vec<Option<Slot>>>,
    pending_names: RefCell<HashMap<String, Dbi>>,
    pending_drops: RefCell<Vec<Dbi>>,
    inconsistent: Cell<bool>,
    _writer: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Txn {
    fn begin(core: Arc<DbCore>, writer: Option<ArcMutexGuard<RawMutex, ()>>) -> Self {
        let slots = core
            .subdbs
            .read()
            .iter()
            .map(|sub| {
                Some(Slot {
                    tree: sub.tree.read().clone(),
                    dirty: false,
                    gen: 0,
                })
            })
            .collect();
        let id = core.txn_ids.fetch_add(1, AtomicOrdering::Relaxed);
        let mode = if writer.is_some() {
            TxnMode::ReadWrite
        } else {
            TxnMode::ReadOnly
        };
        Self {
            core,
            id,
            mode,
            slots: RefCell::new(slots),
            pending_names: RefCell::new(HashMap::new()),
            pending_drops: RefCell::new(Vec::new()),
            inconsistent: Cell::new(false),
            _writer: writer,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    pub fn is_write(&self) -> bool {
        self.mode == TxnMode::ReadWrite
    }

    pub fn config(&self) -> &CoreConfig {
        &self.core.config
    }

    /// Marks the transaction as unrecoverable: a multi-index mutation
    /// failed mid-flight and only `abort` is acceptable from here.
    pub fn mark_inconsistent(&self) {
        self.inconsistent.set(true);
    }

    pub fn is_inconsistent(&self) -> bool {
        self.inconsistent.get()
    }

    fn require_write(&self) -> Result<()> {
        if self.is_write() {
            Ok(())
        } else {
            fault(ErrorKind::InvalidArgument)
        }
    }

    fn subdb(&self, dbi: Dbi) -> Result<Arc<SubDbCore>> {
        self.core
            .subdbs
            .read()
            .get(dbi.index())
            .cloned()
            .map_or_else(|| fault(ErrorKind::InvalidArgument), Ok)
    }

    /// Opens a named sub-DB, creating it when `CREATE` is set in a write
    /// transaction. Re-opening checks that the persistent flags agree.
    pub fn open_sub_db(
        &self,
        name: &str,
        flags: SubDbFlags,
        key_cmp: KeyCmp,
        dup_cmp: KeyCmp,
    ) -> Result<Dbi> {
        let existing = self
            .pending_names
            .borrow()
            .get(name)
            .copied()
            .or_else(|| self.core.catalog.read().get(name).copied());

        if let Some(dbi) = existing {
            if self.slots.borrow().len() <= dbi.index() {
                // Created after this snapshot was taken.
                return fault(ErrorKind::NotFound);
            }
            let sub = self.subdb(dbi)?;
            if sub.flags.persistent() != flags.persistent() {
                return fault(ErrorKind::InvalidArgument);
            }
            return Ok(dbi);
        }

        if !flags.contains(SubDbFlags::CREATE) || !self.is_write() {
            return fault(ErrorKind::NotFound);
        }

        let mut subdbs = self.core.subdbs.write();
        let dbi = Dbi(subdbs.len() as u32);
        subdbs.push(Arc::new(SubDbCore {
            name: name.to_string(),
            flags,
            key_cmp,
            dup_cmp,
            tree: RwLock::new(Arc::new(Vec::new())),
        }));
        drop(subdbs);

        self.slots.borrow_mut().push(Some(Slot {
            tree: Arc::new(Vec::new()),
            dirty: true,
            gen: 0,
        }));
        self.pending_names.borrow_mut().insert(name.to_string(), dbi);
        Ok(dbi)
    }

    /// Empties a sub-DB and unregisters its name at commit.
    pub fn drop_sub_db(&self, dbi: Dbi) -> Result<()> {
        self.require_write()?;
        self.mutate(dbi, |tree| {
            tree.clear();
            Ok(())
        })?;
        self.pending_drops.borrow_mut().push(dbi);
        Ok(())
    }

    pub(crate) fn tree(&self, dbi: Dbi) -> Result<Arc<Tree>> {
        self.slots
            .borrow()
            .get(dbi.index())
            .and_then(|slot| slot.as_ref())
            .map(|slot| slot.tree.clone())
            .map_or_else(|| fault(ErrorKind::InvalidArgument), Ok)
    }

    pub(crate) fn slot_gen(&self, dbi: Dbi) -> u64 {
        self.slots
            .borrow()
            .get(dbi.index())
            .and_then(|slot| slot.as_ref())
            .map(|slot| slot.gen)
            .unwrap_or(0)
    }

    fn mutate<R>(&self, dbi: Dbi, f: impl FnOnce(&mut Tree) -> Result<R>) -> Result<R> {
        self.require_write()?;
        let mut slots = self.slots.borrow_mut();
        let slot = slots
            .get_mut(dbi.index())
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| eyre::Report::new(ErrorKind::InvalidArgument))?;
        let result = f(Arc::make_mut(&mut slot.tree))?;
        slot.dirty = true;
        slot.gen += 1;
        Ok(result)
    }

    /// Applies the sub-DB's key comparator.
    pub fn cmp(&self, dbi: Dbi, a: &[u8], b: &[u8]) -> Ordering {
        let sub = self.subdb(dbi).expect("comparing through a closed sub-DB");
        (sub.key_cmp)(a, b)
    }

    /// Applies the sub-DB's duplicate comparator.
    pub fn dcmp(&self, dbi: Dbi, a: &[u8], b: &[u8]) -> Ordering {
        let sub = self.subdb(dbi).expect("comparing through a closed sub-DB");
        (sub.dup_cmp)(a, b)
    }

    fn search_key(&self, tree: &Tree, dbi: Dbi, key: &[u8]) -> std::result::Result<usize, usize> {
        let sub = self.subdb(dbi).expect("searching a closed sub-DB");
        tree.binary_search_by(|entry| (sub.key_cmp)(&entry.key, key))
    }

    fn search_dup(
        &self,
        entry: &Entry,
        dbi: Dbi,
        val: &[u8],
    ) -> std::result::Result<usize, usize> {
        let sub = self.subdb(dbi).expect("searching a closed sub-DB");
        entry.vals.binary_search_by(|v| (sub.dup_cmp)(v, val))
    }

    /// Point read: the (first) value stored under `key`.
    pub fn get(&self, dbi: Dbi, key: &[u8]) -> Result<Buf> {
        let tree = self.tree(dbi)?;
        match self.search_key(&tree, dbi, key) {
            Ok(i) => Ok(tree[i].vals[0].clone()),
            Err(_) => fault(ErrorKind::NotFound),
        }
    }

    /// Point read returning both the stored key and the value, so the
    /// caller can keep the key alive independently of later mutations.
    pub fn get_ex(&self, dbi: Dbi, key: &[u8]) -> Result<(Buf, Buf)> {
        let tree = self.tree(dbi)?;
        match self.search_key(&tree, dbi, key) {
            Ok(i) => Ok((tree[i].key.clone(), tree[i].vals[0].clone())),
            Err(_) => fault(ErrorKind::NotFound),
        }
    }

    pub fn put(&self, dbi: Dbi, key: &[u8], val: &[u8], flags: PutFlags) -> Result<()> {
        let dup_sort = self.subdb(dbi)?.flags.contains(SubDbFlags::DUP_SORT);
        let found = self.search_key(&*self.tree(dbi)?, dbi, key);
        match found {
            Ok(i) => {
                if flags.contains(PutFlags::NO_OVERWRITE) {
                    return fault(ErrorKind::KeyExist);
                }
                if dup_sort {
                    let pos = {
                        let tree = self.tree(dbi)?;
                        self.search_dup(&tree[i], dbi, val)
                    };
                    match pos {
                        Ok(_) => {
                            if flags.contains(PutFlags::NO_DUP_DATA) {
                                fault(ErrorKind::KeyExist)
                            } else {
                                Ok(())
                            }
                        }
                        Err(j) => self.mutate(dbi, |tree| {
                            tree[i].vals.insert(j, buf(val));
                            Ok(())
                        }),
                    }
                } else {
                    self.mutate(dbi, |tree| {
                        tree[i].vals[0] = buf(val);
                        Ok(())
                    })
                }
            }
            Err(i) => self.mutate(dbi, |tree| {
                tree.insert(
                    i,
                    Entry {
                        key: buf(key),
                        vals: smallvec![buf(val)],
                    },
                );
                Ok(())
            }),
        }
    }

    /// Deletes `key` entirely, or just one duplicate when `data` is given
    /// on a `DUP_SORT` sub-DB.
    pub fn del(&self, dbi: Dbi, key: &[u8], data: Option<&[u8]>) -> Result<()> {
        let dup_sort = self.subdb(dbi)?.flags.contains(SubDbFlags::DUP_SORT);
        let tree = self.tree(dbi)?;
        let i = match self.search_key(&tree, dbi, key) {
            Ok(i) => i,
            Err(_) => return fault(ErrorKind::NotFound),
        };
        match data {
            Some(val) if dup_sort => {
                let j = match self.search_dup(&tree[i], dbi, val) {
                    Ok(j) => j,
                    Err(_) => return fault(ErrorKind::NotFound),
                };
                self.mutate(dbi, |tree| {
                    tree[i].vals.remove(j);
                    if tree[i].vals.is_empty() {
                        tree.remove(i);
                    }
                    Ok(())
                })
            }
            _ => self.mutate(dbi, |tree| {
                tree.remove(i);
                Ok(())
            }),
        }
    }

    /// Atomically reads the old value of `key` and deletes the entry.
    pub fn replace_remove(&self, dbi: Dbi, key: &[u8]) -> Result<Buf> {
        let tree = self.tree(dbi)?;
        let i = match self.search_key(&tree, dbi, key) {
            Ok(i) => i,
            Err(_) => return fault(ErrorKind::NotFound),
        };
        self.mutate(dbi, |tree| {
            let entry = tree.remove(i);
            Ok(entry.vals[0].clone())
        })
    }

    /// Opens a cursor over one sub-DB, bound to this transaction.
    pub fn raw_cursor(&self, dbi: Dbi) -> Result<RawCursor<'_>> {
        let sub = self.subdb(dbi)?;
        Ok(RawCursor {
            txn: self,
            dbi,
            key_cmp: sub.key_cmp,
            dup_cmp: sub.dup_cmp,
            pos: None,
            fix: Fix::Exact,
            cur: None,
            gen: self.slot_gen(dbi),
        })
    }

    /// Publishes the transaction's effects. Fails (and discards everything)
    /// when the transaction was marked inconsistent.
    pub fn commit(self) -> Result<()> {
        if self.inconsistent.get() {
            return fault(ErrorKind::Inconsistent);
        }
        if !self.is_write() {
            return Ok(());
        }

        let subdbs = self.core.subdbs.read();
        for (i, slot) in self.slots.borrow().iter().enumerate() {
            if let Some(slot) = slot {
                if slot.dirty {
                    *subdbs[i].tree.write() = slot.tree.clone();
                }
            }
        }
        drop(subdbs);

        let mut catalog = self.core.catalog.write();
        for (name, dbi) in self.pending_names.borrow().iter() {
            catalog.insert(name.clone(), *dbi);
        }
        for dbi in self.pending_drops.borrow().iter() {
            let name = self.core.subdbs.read()[dbi.index()].name.clone();
            catalog.remove(&name);
        }
        Ok(())
    }

    /// Discards the transaction.
    pub fn abort(self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pos {
    ki: usize,
    di: usize,
}

/// How the cursor's stored position relates to the live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fix {
    /// `pos` addresses the current entry exactly.
    Exact,
    /// The entry the cursor sat on is gone; `pos` addresses its successor.
    Successor,
    /// The cursor walked past the last entry; `pos` addresses the last
    /// entry (when one exists) so `prev` can re-enter the data.
    AtEnd,
}

/// A cursor over one sub-DB with MDBX-style positioning semantics.
pub struct RawCursor<'t> {
    txn: &'t Txn,
    dbi: Dbi,
    key_cmp: KeyCmp,
    dup_cmp: KeyCmp,
    pos: Option<Pos>,
    fix: Fix,
    cur: Option<(Buf, Buf)>,
    gen: u64,
}

impl<'t> RawCursor<'t> {
    pub fn dbi(&self) -> Dbi {
        self.dbi
    }

    fn item(tree: &Tree, pos: Pos) -> (Buf, Buf) {
        let entry = &tree[pos.ki];
        (entry.key.clone(), entry.vals[pos.di].clone())
    }

    fn last_pos(tree: &Tree) -> Option<Pos> {
        if tree.is_empty() {
            None
        } else {
            let ki = tree.len() - 1;
            Some(Pos {
                ki,
                di: tree[ki].vals.len() - 1,
            })
        }
    }

    fn settle(&mut self, tree: &Tree, pos: Pos) -> (Buf, Buf) {
        self.pos = Some(pos);
        self.fix = Fix::Exact;
        let item = Self::item(tree, pos);
        self.cur = Some(item.clone());
        self.gen = self.txn.slot_gen(self.dbi);
        item
    }

    fn park_at_end(&mut self, tree: &Tree) {
        self.pos = Self::last_pos(tree);
        self.fix = Fix::AtEnd;
    }

    /// Re-anchors the stored position after mutations elsewhere in the
    /// transaction touched this sub-DB.
    fn sync(&mut self, tree: &Tree) {
        let gen = self.txn.slot_gen(self.dbi);
        if gen == self.gen {
            return;
        }
        self.gen = gen;
        let Some((key, val)) = self.cur.clone() else {
            return;
        };
        match tree.binary_search_by(|e| (self.key_cmp)(&e.key, &key)) {
            Ok(ki) => match tree[ki].vals.binary_search_by(|v| (self.dup_cmp)(v, &val)) {
                Ok(di) => {
                    self.pos = Some(Pos { ki, di });
                    if self.fix != Fix::AtEnd {
                        self.fix = Fix::Exact;
                    }
                }
                Err(di) if di < tree[ki].vals.len() => {
                    self.pos = Some(Pos { ki, di });
                    self.fix = Fix::Successor;
                }
                Err(_) => {
                    if ki + 1 < tree.len() {
                        self.pos = Some(Pos { ki: ki + 1, di: 0 });
                        self.fix = Fix::Successor;
                    } else {
                        self.park_at_end(tree);
                    }
                }
            },
            Err(ki) => {
                if ki < tree.len() {
                    self.pos = Some(Pos { ki, di: 0 });
                    self.fix = Fix::Successor;
                } else {
                    self.park_at_end(tree);
                }
            }
        }
    }

    /// True when the cursor's stored entry still exists and its key equals
    /// the key at the resolved position.
    fn same_key(&self, tree: &Tree, pos: Pos) -> bool {
        match &self.cur {
            Some((key, _)) => (self.key_cmp)(&tree[pos.ki].key, key) == Ordering::Equal,
            None => false,
        }
    }

    fn step_next(tree: &Tree, pos: Pos) -> Option<Pos> {
        if pos.di + 1 < tree[pos.ki].vals.len() {
            Some(Pos {
                ki: pos.ki,
                di: pos.di + 1,
            })
        } else if pos.ki + 1 < tree.len() {
            Some(Pos {
                ki: pos.ki + 1,
                di: 0,
            })
        } else {
            None
        }
    }

    fn step_prev(tree: &Tree, pos: Pos) -> Option<Pos> {
        if pos.di > 0 {
            Some(Pos {
                ki: pos.ki,
                di: pos.di - 1,
            })
        } else if pos.ki > 0 {
            let ki = pos.ki - 1;
            Some(Pos {
                ki,
                di: tree[ki].vals.len() - 1,
            })
        } else {
            None
        }
    }

    /// The cursor `get` primitive: seeks or steps per `op` and returns the
    /// landed `(key, value)`.
    pub fn get(
        &mut self,
        op: SeekOp,
        key: Option<&[u8]>,
        data: Option<&[u8]>,
    ) -> Result<(Buf, Buf)> {
        let tree = self.txn.tree(self.dbi)?;
        self.sync(&tree);

        match op {
            SeekOp::First => {
                if tree.is_empty() {
                    self.pos = None;
                    self.fix = Fix::AtEnd;
                    return fault(ErrorKind::NotFound);
                }
                Ok(self.settle(&tree, Pos { ki: 0, di: 0 }))
            }

            SeekOp::Last => match Self::last_pos(&tree) {
                Some(pos) => Ok(self.settle(&tree, pos)),
                None => {
                    self.pos = None;
                    self.fix = Fix::AtEnd;
                    fault(ErrorKind::NotFound)
                }
            },

            SeekOp::GetCurrent => match (self.fix, self.pos) {
                (Fix::AtEnd, _) | (_, None) => fault(ErrorKind::NotFound),
                (_, Some(pos)) => Ok(self.settle(&tree, pos)),
            },

            SeekOp::SetKey => {
                let target = key.ok_or_else(|| eyre::Report::new(ErrorKind::InvalidArgument))?;
                match tree.binary_search_by(|e| (self.key_cmp)(&e.key, target)) {
                    Ok(ki) => Ok(self.settle(&tree, Pos { ki, di: 0 })),
                    Err(_) => fault(ErrorKind::NotFound),
                }
            }

            SeekOp::SetRange => {
                let target = key.ok_or_else(|| eyre::Report::new(ErrorKind::InvalidArgument))?;
                match tree.binary_search_by(|e| (self.key_cmp)(&e.key, target)) {
                    Ok(ki) | Err(ki) if ki < tree.len() => {
                        Ok(self.settle(&tree, Pos { ki, di: 0 }))
                    }
                    _ => {
                        self.park_at_end(&tree);
                        fault(ErrorKind::NotFound)
                    }
                }
            }

            SeekOp::GetBoth | SeekOp::GetBothRange => {
                let target = key.ok_or_else(|| eyre::Report::new(ErrorKind::InvalidArgument))?;
                let dup = data.ok_or_else(|| eyre::Report::new(ErrorKind::InvalidArgument))?;
                let ki = match tree.binary_search_by(|e| (self.key_cmp)(&e.key, target)) {
                    Ok(ki) => ki,
                    Err(_) => return fault(ErrorKind::NotFound),
                };
                let dup_pos = tree[ki].vals.binary_search_by(|v| (self.dup_cmp)(v, dup));
                match (op, dup_pos) {
                    (_, Ok(di)) => Ok(self.settle(&tree, Pos { ki, di })),
                    (SeekOp::GetBothRange, Err(di)) if di < tree[ki].vals.len() => {
                        Ok(self.settle(&tree, Pos { ki, di }))
                    }
                    _ => {
                        self.pos = Some(Pos {
                            ki,
                            di: tree[ki].vals.len() - 1,
                        });
                        self.fix = Fix::AtEnd;
                        fault(ErrorKind::NotFound)
                    }
                }
            }

            SeekOp::Next => match (self.fix, self.pos) {
                (Fix::AtEnd, _) => fault(ErrorKind::NotFound),
                (_, None) => self.get(SeekOp::First, None, None),
                (Fix::Successor, Some(pos)) => Ok(self.settle(&tree, pos)),
                (Fix::Exact, Some(pos)) => match Self::step_next(&tree, pos) {
                    Some(next) => Ok(self.settle(&tree, next)),
                    None => {
                        self.park_at_end(&tree);
                        fault(ErrorKind::NotFound)
                    }
                },
            },

            SeekOp::Prev => match (self.fix, self.pos) {
                (_, None) => self.get(SeekOp::Last, None, None),
                (Fix::AtEnd, Some(pos)) => Ok(self.settle(&tree, pos)),
                (_, Some(pos)) => match Self::step_prev(&tree, pos) {
                    Some(prev) => Ok(self.settle(&tree, prev)),
                    None => fault(ErrorKind::NotFound),
                },
            },

            SeekOp::NextNoDup => match (self.fix, self.pos) {
                (Fix::AtEnd, _) => fault(ErrorKind::NotFound),
                (_, None) => self.get(SeekOp::First, None, None),
                (Fix::Successor, Some(pos)) if !self.same_key(&tree, pos) => {
                    Ok(self.settle(&tree, pos))
                }
                (_, Some(pos)) => {
                    if pos.ki + 1 < tree.len() {
                        Ok(self.settle(&tree, Pos { ki: pos.ki + 1, di: 0 }))
                    } else {
                        self.park_at_end(&tree);
                        fault(ErrorKind::NotFound)
                    }
                }
            },

            SeekOp::PrevNoDup => match (self.fix, self.pos) {
                (_, None) => self.get(SeekOp::Last, None, None),
                (Fix::AtEnd, Some(pos)) => Ok(self.settle(&tree, Pos { ki: pos.ki, di: 0 })),
                (_, Some(pos)) => {
                    if pos.ki > 0 {
                        let ki = pos.ki - 1;
                        Ok(self.settle(
                            &tree,
                            Pos {
                                ki,
                                di: tree[ki].vals.len() - 1,
                            },
                        ))
                    } else {
                        fault(ErrorKind::NotFound)
                    }
                }
            },

            SeekOp::NextDup => match (self.fix, self.pos) {
                (Fix::AtEnd, _) | (_, None) => fault(ErrorKind::NotFound),
                (Fix::Successor, Some(pos)) => {
                    if self.same_key(&tree, pos) {
                        Ok(self.settle(&tree, pos))
                    } else {
                        fault(ErrorKind::NotFound)
                    }
                }
                (Fix::Exact, Some(pos)) => {
                    if pos.di + 1 < tree[pos.ki].vals.len() {
                        Ok(self.settle(
                            &tree,
                            Pos {
                                ki: pos.ki,
                                di: pos.di + 1,
                            },
                        ))
                    } else {
                        fault(ErrorKind::NotFound)
                    }
                }
            },

            SeekOp::PrevDup => match (self.fix, self.pos) {
                (Fix::AtEnd, _) | (_, None) => fault(ErrorKind::NotFound),
                (Fix::Successor, Some(pos)) => {
                    if self.same_key(&tree, pos) && pos.di > 0 {
                        Ok(self.settle(
                            &tree,
                            Pos {
                                ki: pos.ki,
                                di: pos.di - 1,
                            },
                        ))
                    } else {
                        fault(ErrorKind::NotFound)
                    }
                }
                (Fix::Exact, Some(pos)) => {
                    if pos.di > 0 {
                        Ok(self.settle(
                            &tree,
                            Pos {
                                ki: pos.ki,
                                di: pos.di - 1,
                            },
                        ))
                    } else {
                        fault(ErrorKind::NotFound)
                    }
                }
            },

            SeekOp::FirstDup => match self.pos {
                Some(pos) if self.fix != Fix::AtEnd => {
                    Ok(self.settle(&tree, Pos { ki: pos.ki, di: 0 }))
                }
                _ => fault(ErrorKind::NotFound),
            },

            SeekOp::LastDup => match self.pos {
                Some(pos) if self.fix != Fix::AtEnd => Ok(self.settle(
                    &tree,
                    Pos {
                        ki: pos.ki,
                        di: tree[pos.ki].vals.len() - 1,
                    },
                )),
                _ => fault(ErrorKind::NotFound),
            },
        }
    }

    /// Writes through the cursor. `CURRENT` replaces the value at the
    /// cursor's position (re-sorting duplicates as needed); otherwise this
    /// behaves like a positioned insert.
    pub fn put(&mut self, key: &[u8], val: &[u8], flags: PutFlags) -> Result<()> {
        self.txn.require_write()?;
        let tree = self.txn.tree(self.dbi)?;
        self.sync(&tree);

        if flags.contains(PutFlags::CURRENT) {
            let Some(pos) = self.pos else {
                return fault(ErrorKind::CursorInvalid);
            };
            if self.fix != Fix::Exact {
                return fault(ErrorKind::CursorInvalid);
            }
            if (self.key_cmp)(&tree[pos.ki].key, key) != Ordering::Equal {
                return fault(ErrorKind::InvalidArgument);
            }
            let dup_sort = self
                .txn
                .subdb(self.dbi)?
                .flags
                .contains(SubDbFlags::DUP_SORT);
            let dup_cmp = self.dup_cmp;
            let new_di = self.txn.mutate(self.dbi, |tree| {
                let entry = &mut tree[pos.ki];
                if !dup_sort {
                    entry.vals[0] = buf(val);
                    return Ok(0usize);
                }
                let old = entry.vals.remove(pos.di);
                match entry.vals.binary_search_by(|v| dup_cmp(v, val)) {
                    Ok(_) => {
                        entry.vals.insert(pos.di, old);
                        fault(ErrorKind::KeyExist)
                    }
                    Err(j) => {
                        entry.vals.insert(j, buf(val));
                        Ok(j)
                    }
                }
            })?;
            let tree = self.txn.tree(self.dbi)?;
            self.gen = self.txn.slot_gen(self.dbi);
            self.settle(&tree, Pos { ki: pos.ki, di: new_di });
            return Ok(());
        }

        self.txn.put(self.dbi, key, val, flags)?;
        let tree = self.txn.tree(self.dbi)?;
        self.gen = self.txn.slot_gen(self.dbi);
        let ki = match tree.binary_search_by(|e| (self.key_cmp)(&e.key, key)) {
            Ok(ki) => ki,
            Err(_) => return fault(ErrorKind::InternalOops),
        };
        let di = tree[ki]
            .vals
            .binary_search_by(|v| (self.dup_cmp)(v, val))
            .unwrap_or(0);
        self.settle(&tree, Pos { ki, di });
        Ok(())
    }

    /// Deletes the entry at the cursor's position; the cursor ends up on
    /// the successor (or in the end-of-data state).
    pub fn del(&mut self) -> Result<()> {
        self.txn.require_write()?;
        let tree = self.txn.tree(self.dbi)?;
        self.sync(&tree);
        let Some(pos) = self.pos else {
            return fault(ErrorKind::CursorInvalid);
        };
        if self.fix != Fix::Exact {
            return fault(ErrorKind::CursorInvalid);
        }

        // Keep the deleted item as the anchor so successor logic can tell
        // whether later steps stay within the same key.
        self.cur = Some(Self::item(&tree, pos));

        self.txn.mutate(self.dbi, |tree| {
            let entry = &mut tree[pos.ki];
            entry.vals.remove(pos.di);
            if entry.vals.is_empty() {
                tree.remove(pos.ki);
            }
            Ok(())
        })?;

        let tree = self.txn.tree(self.dbi)?;
        self.gen = self.txn.slot_gen(self.dbi);
        if tree.is_empty() {
            self.pos = None;
            self.fix = Fix::AtEnd;
        } else if pos.ki < tree.len() && pos.di < tree[pos.ki].vals.len() {
            self.pos = Some(pos);
            self.fix = Fix::Successor;
        } else if pos.ki < tree.len() && pos.di >= tree[pos.ki].vals.len() {
            if pos.ki + 1 < tree.len() {
                self.pos = Some(Pos {
                    ki: pos.ki + 1,
                    di: 0,
                });
                self.fix = Fix::Successor;
            } else {
                self.park_at_end(&tree);
            }
        } else {
            self.park_at_end(&tree);
        }
        Ok(())
    }

    /// Number of duplicates at the current key (1 on non-dup sub-DBs).
    pub fn dup_count(&mut self) -> Result<usize> {
        let tree = self.txn.tree(self.dbi)?;
        self.sync(&tree);
        match (self.fix, self.pos) {
            (Fix::AtEnd, _) | (_, None) => fault(ErrorKind::NotFound),
            (_, Some(pos)) => Ok(tree[pos.ki].vals.len()),
        }
    }

    /// True when positioned on the physically first entry.
    pub fn on_first(&mut self) -> Result<bool> {
        let tree = self.txn.tree(self.dbi)?;
        self.sync(&tree);
        Ok(matches!(self.pos, Some(pos) if pos.ki == 0 && pos.di == 0))
    }

    /// True when positioned on the physically last entry.
    pub fn on_last(&mut self) -> Result<bool> {
        let tree = self.txn.tree(self.dbi)?;
        self.sync(&tree);
        match self.pos {
            Some(pos) => {
                Ok(pos.ki + 1 == tree.len() && pos.di + 1 == tree[pos.ki].vals.len())
            }
            None => Ok(false),
        }
    }

    /// True when the cursor has walked past the data.
    pub fn eof(&mut self) -> Result<bool> {
        let tree = self.txn.tree(self.dbi)?;
        self.sync(&tree);
        Ok(self.fix == Fix::AtEnd || self.pos.is_none())
    }
}
