//! The local commerce store: favorites, saved-for-later and the cart.
//!
//! A [`CommerceStore`] is a cheap, cloneable handle. Every UI surface that
//! shows or edits these collections gets a clone of the *same* handle, reads
//! through it and writes through it, and subscribes to it if it needs to
//! re-render when another surface changes something. There is no per-surface
//! copy of the state and no ambient global.
//!
//! Each mutation:
//!
//! 1. applies to the in-memory [`StoreSnapshot`] under the state lock,
//! 2. writes the complete snapshot to the single storage key before the lock
//!    is released,
//! 3. notifies subscribers with a [`StoreChange`] once the lock is released, so
//!    listeners may call back into the store.
//!
//! Storage failures never undo a mutation; they are logged and counted in
//! [`CommerceStore::persist_failures`].
//!
//! Opening a store twice over the same storage location and namespace while
//! the first handle is alive returns that live handle, so two independently
//! opened handles can never hold diverging copies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::local_storage::KeyValueStorage;
use crate::store_model::{BookId, CartItem, CartLineItem, CartTotals, StoreSnapshot};

/// Default namespace for the snapshot key. Only a store under this namespace
/// imports and cleans up the keys of the older storage layout.
pub const DEFAULT_NAMESPACE: &str = "BookStore_";

const SNAPSHOT_KEY_SUFFIX: &str = "snapshot";

/// Composite redux-era state (`{cart, wishlist, saved}`).
const LEGACY_STATE_KEY: &str = "bookStoreState";
/// Page-level keys, one per collection.
const LEGACY_PAGE_KEYS: [&str; 3] = ["BookStoreFavorites", "BookStoreSaved", "BookStoreCart"];
/// Card-level keys, one per collection.
const LEGACY_CARD_KEYS: [&str; 3] = ["BookStore_favorites", "BookStore_saved", "BookStore_cart"];

pub type SubscriptionId = u64;

type Listener = Arc<dyn Fn(&StoreChange) + Send + Sync>;

/// `(storage location, namespace)`.
type StoreKey = (String, String);

/// Stores currently open in this process.
fn live_stores() -> &'static Mutex<HashMap<StoreKey, Weak<StoreInner>>> {
    static STORES: OnceLock<Mutex<HashMap<StoreKey, Weak<StoreInner>>>> = OnceLock::new();
    STORES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Which collection a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Favorites,
    Saved,
    Cart,
    Reset,
}

/// Delivered to every subscriber after a mutation has been applied and
/// persisted. `revision` grows by one per mutation; a listener that sees a
/// revision lower than one it already handled can ignore it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreChange {
    pub kind: ChangeKind,
    pub revision: u64,
    pub snapshot: StoreSnapshot,
}

struct StoreState {
    snapshot: StoreSnapshot,
    storage: Box<dyn KeyValueStorage>,
    snapshot_key: String,
    revision: u64,
    /// Whether this namespace owns the older storage layout's keys.
    owns_legacy: bool,
    legacy_pending: bool,
    persist_failures: u64,
}

struct StoreInner {
    state: Mutex<StoreState>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

/// Shared handle over the commerce state. Clone it to hand it to another
/// surface; all clones observe and mutate the same state.
#[derive(Clone)]
pub struct CommerceStore {
    inner: Arc<StoreInner>,
}

impl CommerceStore {
    /// Loads the last snapshot from `storage` under `namespace` and returns a
    /// handle to it.
    ///
    /// If a store over the same [`location`](KeyValueStorage::location) and
    /// namespace is still alive, a clone of that handle is returned instead and
    /// `storage` is dropped.
    ///
    /// Never fails: a missing, unreadable or malformed snapshot yields empty
    /// collections, and the next mutation overwrites whatever was stored.
    pub fn open(storage: impl KeyValueStorage + 'static, namespace: &str) -> Self {
        let Some(location) = storage.location() else {
            return Self::load(storage, namespace);
        };
        let key = (location, namespace.to_string());

        let mut stores = live_stores().lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(inner) = stores.get(&key).and_then(Weak::upgrade) {
            debug!("Sharing live store for '{}' at {}", key.1, key.0);
            return CommerceStore { inner };
        }

        let store = Self::load(storage, namespace);
        stores.retain(|_, inner| inner.strong_count() > 0);
        stores.insert(key, Arc::downgrade(&store.inner));
        store
    }

    /// Whether `other` is a handle to the same live store.
    pub fn same_store(&self, other: &CommerceStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn load(storage: impl KeyValueStorage + 'static, namespace: &str) -> Self {
        let snapshot_key = format!("{namespace}{SNAPSHOT_KEY_SUFFIX}");
        let owns_legacy = namespace == DEFAULT_NAMESPACE;
        let (snapshot, legacy_pending) = load_snapshot(&storage, &snapshot_key, owns_legacy);

        info!(
            "Commerce store opened at '{}': {} favorites, {} saved, {} cart lines",
            snapshot_key,
            snapshot.favorites.len(),
            snapshot.saved.len(),
            snapshot.cart.len()
        );

        let state = StoreState {
            snapshot,
            storage: Box::new(storage),
            snapshot_key,
            revision: 0,
            owns_legacy,
            legacy_pending,
            persist_failures: 0,
        };

        CommerceStore {
            inner: Arc::new(StoreInner {
                state: Mutex::new(state),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock_state().snapshot.clone()
    }

    pub fn favorites(&self) -> Vec<BookId> {
        self.lock_state().snapshot.favorites.clone()
    }

    pub fn saved(&self) -> Vec<BookId> {
        self.lock_state().snapshot.saved.clone()
    }

    pub fn cart(&self) -> Vec<CartLineItem> {
        self.lock_state().snapshot.cart.clone()
    }

    pub fn cart_totals(&self) -> CartTotals {
        self.lock_state().snapshot.totals()
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.lock_state().snapshot.favorites.iter().any(|f| f == id)
    }

    pub fn is_saved(&self, id: &str) -> bool {
        self.lock_state().snapshot.saved.iter().any(|s| s == id)
    }

    pub fn cart_item(&self, id: &str) -> Option<CartLineItem> {
        self.lock_state()
            .snapshot
            .cart
            .iter()
            .find(|line| line.id == id)
            .cloned()
    }

    /// Quantity in the cart for `id`, zero when absent.
    pub fn cart_quantity(&self, id: &str) -> u32 {
        self.cart_item(id).map(|line| line.quantity).unwrap_or(0)
    }

    pub fn revision(&self) -> u64 {
        self.lock_state().revision
    }

    /// Number of snapshot writes that failed since the store was opened.
    pub fn persist_failures(&self) -> u64 {
        self.lock_state().persist_failures
    }

    // ---------------------------------------------------------------
    // Favorites and saved-for-later
    // ---------------------------------------------------------------

    /// Adds `id` to favorites, or removes it if already there. Returns whether
    /// `id` is a favorite afterwards. An empty `id` is ignored.
    pub fn toggle_favorite(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        let mut now_present = false;
        self.mutate(ChangeKind::Favorites, |snapshot| {
            now_present = toggle_id(&mut snapshot.favorites, id);
            true
        });
        now_present
    }

    /// Same as [`toggle_favorite`](Self::toggle_favorite) for the saved set.
    pub fn toggle_saved(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        let mut now_present = false;
        self.mutate(ChangeKind::Saved, |snapshot| {
            now_present = toggle_id(&mut snapshot.saved, id);
            true
        });
        now_present
    }

    /// Idempotent add. Returns `true` if the set changed.
    pub fn add_favorite(&self, id: &str) -> bool {
        self.mutate(ChangeKind::Favorites, |snapshot| insert_id(&mut snapshot.favorites, id))
    }

    pub fn remove_favorite(&self, id: &str) -> bool {
        self.mutate(ChangeKind::Favorites, |snapshot| remove_id(&mut snapshot.favorites, id))
    }

    pub fn add_saved(&self, id: &str) -> bool {
        self.mutate(ChangeKind::Saved, |snapshot| insert_id(&mut snapshot.saved, id))
    }

    pub fn remove_saved(&self, id: &str) -> bool {
        self.mutate(ChangeKind::Saved, |snapshot| remove_id(&mut snapshot.saved, id))
    }

    // ---------------------------------------------------------------
    // Cart
    // ---------------------------------------------------------------

    /// Puts one more copy of `item` in the cart.
    ///
    /// An existing line keeps its cached title, price and image and gets its
    /// quantity bumped. An item without an identifier is ignored.
    pub fn add_to_cart(&self, item: CartItem) -> bool {
        if item.id.is_empty() {
            debug!("Ignoring add_to_cart for an item without identifier");
            return false;
        }

        self.mutate(ChangeKind::Cart, move |snapshot| {
            match snapshot.cart.iter_mut().find(|line| line.id == item.id) {
                Some(line) => line.quantity = line.quantity.saturating_add(1),
                None => snapshot.cart.push(CartLineItem::from_item(item)),
            }
            true
        })
    }

    pub fn remove_from_cart(&self, id: &str) -> bool {
        self.mutate(ChangeKind::Cart, |snapshot| {
            let before = snapshot.cart.len();
            snapshot.cart.retain(|line| line.id != id);
            snapshot.cart.len() != before
        })
    }

    /// Sets the quantity of an existing line.
    ///
    /// Quantities below one are rejected without touching the cart; deleting
    /// a line is [`remove_from_cart`](Self::remove_from_cart)'s job.
    pub fn update_quantity(&self, id: &str, new_quantity: i64) -> bool {
        if new_quantity < 1 {
            debug!("Rejecting quantity {new_quantity} for '{id}'");
            return false;
        }
        let quantity = u32::try_from(new_quantity).unwrap_or(u32::MAX);

        self.mutate(ChangeKind::Cart, |snapshot| {
            match snapshot.cart.iter_mut().find(|line| line.id == id) {
                Some(line) if line.quantity != quantity => {
                    line.quantity = quantity;
                    true
                }
                _ => false,
            }
        })
    }

    /// Empties all three collections and deletes the stored snapshot. Under
    /// the default namespace, leftover keys of the old layout go too.
    pub fn reset(&self) {
        let change = {
            let mut state = self.lock_state();
            state.snapshot = StoreSnapshot::default();
            state.revision += 1;

            let snapshot_key = state.snapshot_key.clone();
            if let Err(e) = state.storage.remove_item(&snapshot_key) {
                state.persist_failures += 1;
                error!("Failed to delete snapshot '{snapshot_key}': {e}");
            }
            if state.owns_legacy {
                remove_legacy_keys(state.storage.as_ref());
            }
            state.legacy_pending = false;

            StoreChange {
                kind: ChangeKind::Reset,
                revision: state.revision,
                snapshot: state.snapshot.clone(),
            }
        };
        info!("Commerce store reset");
        self.notify(&change);
    }

    // ---------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------

    /// Registers `listener` to be called after every mutation.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        self.lock_listeners().push((id, listener));
        debug!("Subscriber {id} registered");
        id
    }

    /// Returns `true` if the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_listeners().len()
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    /// Runs `apply` under the state lock. When it reports a change, the new
    /// snapshot is persisted and subscribers are notified.
    fn mutate<F>(&self, kind: ChangeKind, apply: F) -> bool
    where
        F: FnOnce(&mut StoreSnapshot) -> bool,
    {
        let change = {
            let mut state = self.lock_state();
            if !apply(&mut state.snapshot) {
                return false;
            }
            state.revision += 1;
            state.persist();
            StoreChange {
                kind,
                revision: state.revision,
                snapshot: state.snapshot.clone(),
            }
        };
        self.notify(&change);
        true
    }

    fn notify(&self, change: &StoreChange) {
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(change);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Listener)>> {
        self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StoreState {
    fn persist(&mut self) {
        let json = match serde_json::to_string(&self.snapshot) {
            Ok(json) => json,
            Err(e) => {
                self.persist_failures += 1;
                error!("Could not serialize snapshot: {e}");
                return;
            }
        };

        match self.storage.set_item(&self.snapshot_key, &json) {
            Ok(()) => {
                if self.legacy_pending {
                    remove_legacy_keys(self.storage.as_ref());
                    self.legacy_pending = false;
                }
            }
            Err(e) => {
                self.persist_failures += 1;
                error!("Could not save snapshot '{}': {e}", self.snapshot_key);
            }
        }
    }
}

/// Returns whether `id` is present after the toggle.
fn toggle_id(ids: &mut Vec<BookId>, id: &str) -> bool {
    if remove_id(ids, id) {
        false
    } else {
        ids.push(id.to_string());
        true
    }
}

fn insert_id(ids: &mut Vec<BookId>, id: &str) -> bool {
    if id.is_empty() || ids.iter().any(|existing| existing == id) {
        return false;
    }
    ids.push(id.to_string());
    true
}

fn remove_id(ids: &mut Vec<BookId>, id: &str) -> bool {
    let before = ids.len();
    ids.retain(|existing| existing != id);
    ids.len() != before
}

/// Reads the canonical snapshot, falling back to the legacy keys (when
/// `owns_legacy`) if it has never been written. The flag tells whether legacy
/// keys were imported and should be deleted after the first successful write.
fn load_snapshot(
    storage: &dyn KeyValueStorage,
    snapshot_key: &str,
    owns_legacy: bool,
) -> (StoreSnapshot, bool) {
    match storage.get_item(snapshot_key) {
        Ok(Some(text)) => match serde_json::from_str::<StoreSnapshot>(&text) {
            Ok(snapshot) => (snapshot.normalized(), false),
            Err(e) => {
                warn!("Discarding malformed snapshot '{snapshot_key}': {e}");
                (StoreSnapshot::default(), false)
            }
        },
        Ok(None) if !owns_legacy => (StoreSnapshot::default(), false),
        Ok(None) => match import_legacy(storage) {
            Some(snapshot) => {
                info!(
                    "Migrated legacy state: {} favorites, {} saved, {} cart lines",
                    snapshot.favorites.len(),
                    snapshot.saved.len(),
                    snapshot.cart.len()
                );
                (snapshot, true)
            }
            None => (StoreSnapshot::default(), false),
        },
        Err(e) => {
            warn!("Could not read snapshot '{snapshot_key}', starting empty: {e}");
            (StoreSnapshot::default(), false)
        }
    }
}

/// Merges every legacy key that parses. Page-level keys win over the redux
/// state, which wins over card-level keys, when the same cart line appears in
/// more than one place.
fn import_legacy(storage: &dyn KeyValueStorage) -> Option<StoreSnapshot> {
    let [page_favorites, page_saved, page_cart] = LEGACY_PAGE_KEYS;
    let [card_favorites, card_saved, card_cart] = LEGACY_CARD_KEYS;

    let sources = [
        StoreSnapshot {
            favorites: read_legacy(storage, page_favorites).unwrap_or_default(),
            saved: read_legacy(storage, page_saved).unwrap_or_default(),
            cart: read_legacy(storage, page_cart).unwrap_or_default(),
        },
        read_legacy(storage, LEGACY_STATE_KEY).unwrap_or_default(),
        StoreSnapshot {
            favorites: read_legacy(storage, card_favorites).unwrap_or_default(),
            saved: read_legacy(storage, card_saved).unwrap_or_default(),
            cart: read_legacy(storage, card_cart).unwrap_or_default(),
        },
    ];

    let mut merged = StoreSnapshot::default();
    for source in sources {
        let source = source.normalized();
        merged.favorites.extend(source.favorites);
        merged.saved.extend(source.saved);
        for line in source.cart {
            if !merged.cart.iter().any(|existing| existing.id == line.id) {
                merged.cart.push(line);
            }
        }
    }

    let merged = merged.normalized();
    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

fn read_legacy<T: serde::de::DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Option<T> {
    let text = match storage.get_item(key) {
        Ok(Some(text)) => text,
        Ok(None) => return None,
        Err(e) => {
            warn!("Could not read legacy key '{key}': {e}");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring malformed legacy key '{key}': {e}");
            None
        }
    }
}

fn remove_legacy_keys(storage: &dyn KeyValueStorage) {
    let keys = std::iter::once(LEGACY_STATE_KEY)
        .chain(LEGACY_PAGE_KEYS)
        .chain(LEGACY_CARD_KEYS);
    for key in keys {
        match storage.remove_item(key) {
            Ok(true) => debug!("Removed legacy key '{key}'"),
            Ok(false) => {}
            Err(e) => warn!("Could not remove legacy key '{key}': {e}"),
        }
    }
}
