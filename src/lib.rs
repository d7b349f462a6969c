//! # Bookstore Core
//!
//! Local-first state for a book storefront UI: favorites, saved-for-later and a
//! shopping cart persisted in LMDB, plus the catalog search plumbing that feeds
//! the product grid. Designed to sit behind a UI shell through FFI, or to be
//! used directly from Rust.
//!
//! ## Features
//!
//! - **One shared store**: every surface (header badge, product card, cart
//!   panel) holds a handle to the same [`CommerceStore`] and can subscribe to it
//! - **Write-through persistence**: each mutation writes the whole snapshot to
//!   one storage key before returning
//! - **Forgiving loads**: a missing or corrupt snapshot opens as an empty store
//! - **Stale-safe search**: [`SearchSession`] drops responses of superseded requests
//! - **Safe error handling**: No `unwrap()` calls in production code
//!
//! ## Quick Start
//!
//! ```
//! use bookstore_core::{CartItem, CommerceStore, MemoryStorage, Price};
//!
//! let store = CommerceStore::open(MemoryStorage::new(), "BookStore_");
//! let header = store.clone();
//!
//! store.add_to_cart(CartItem::new("A1", "Foo", Price::from_cents(999), "cover.png"));
//! store.add_to_cart(CartItem::new("A1", "Foo", Price::from_cents(999), "cover.png"));
//!
//! assert_eq!(header.cart_totals().item_count, 2);
//! assert_eq!(header.cart_totals().total_display, "19.98");
//! ```
//!
//! ## FFI Functions
//!
//! Every function answers with a JSON-encoded [`AppResponse`] string that the
//! caller releases with [`free_response`]:
//!
//! - [`create_store`] / [`create_store_from_config`] - Open a store handle
//! - [`toggle_favorite`] / [`toggle_saved`] - Flip set membership
//! - [`add_to_cart`] / [`remove_from_cart`] / [`update_quantity`] - Edit the cart
//! - [`get_snapshot`] / [`get_cart_totals`] - Read state
//! - [`subscribe_changes`] / [`unsubscribe_changes`] - Change notifications
//! - [`reset_store`] - Clear everything
//! - [`close_store`] - Release the handle

pub mod app_response;
pub mod catalog;
pub mod catalog_client;
pub mod commerce_store;
pub mod config;
pub mod local_storage;
pub mod search_session;
pub mod store_model;

pub use crate::app_response::AppResponse;
pub use crate::catalog::{BookRecord, CatalogQuery, CatalogRequest};
pub use crate::catalog_client::{CatalogClient, CatalogSource};
pub use crate::commerce_store::{ChangeKind, CommerceStore, StoreChange, SubscriptionId};
pub use crate::config::StoreConfig;
pub use crate::local_storage::{KeyValueStorage, LmdbStorage, MemoryStorage};
pub use crate::search_session::{SearchSession, SearchState};
pub use crate::store_model::{CartItem, CartLineItem, CartTotals, Price, StoreSnapshot};

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde::Serialize;

/// Opens the LMDB environment named in `config` and loads the store from it.
///
/// # Errors
///
/// Only opening the storage can fail; snapshot problems are recovered inside
/// [`CommerceStore::open`].
pub fn open_store(config: &StoreConfig) -> Result<CommerceStore, AppResponse> {
    let storage = LmdbStorage::open(&config.storage_path, config.map_size)?;
    info!("Storage ready at {}", storage.path().display());
    Ok(CommerceStore::open(storage, &config.namespace))
}

#[derive(Serialize)]
struct ToggleResult<'a> {
    id: &'a str,
    active: bool,
}

#[derive(Serialize)]
struct CartMutationResult {
    applied: bool,
    totals: CartTotals,
}

#[derive(Serialize)]
struct SubscriptionResult {
    subscription_id: SubscriptionId,
}

/// Creates a store persisted at `<name>.lmdb` with default settings.
///
/// Calling this again with the same name while an earlier handle is open
/// returns a new pointer to the *same* live store, so surfaces that each call
/// `create_store` still observe one shared state. Each pointer is released
/// separately with [`close_store`].
///
/// # Parameters
///
/// * `name` - A null-terminated C string naming the storage directory
///
/// # Returns
///
/// Returns a pointer to a [`CommerceStore`] handle on success, or a null
/// pointer on failure.
///
/// # Safety
///
/// This function is unsafe because it:
/// - Dereferences a raw pointer without validation
/// - Returns a raw pointer that must be released with [`close_store`]
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use bookstore_core::create_store;
///
/// let name = CString::new("bookstore").unwrap();
/// let store = create_store(name.as_ptr());
/// assert!(!store.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store(name: *const c_char) -> *mut CommerceStore {
    if name.is_null() {
        warn!("Null name pointer passed to create_store");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let config = StoreConfig {
        storage_path: name_str.to_string(),
        ..StoreConfig::default()
    };
    open_store_ptr(&config)
}

/// Creates a store from TOML configuration text (see [`config`]), with the
/// environment overrides applied. Shares a live store like [`create_store`].
///
/// # Parameters
///
/// * `toml_ptr` - A null-terminated C string containing the configuration
///
/// # Returns
///
/// Returns a store pointer, or null when the pointer is null, the text is not
/// valid configuration, or the storage cannot be opened.
///
/// # Safety
///
/// `toml_ptr` must be null or point to a valid null-terminated string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store_from_config(toml_ptr: *const c_char) -> *mut CommerceStore {
    if toml_ptr.is_null() {
        warn!("Null config pointer passed to create_store_from_config");
        return std::ptr::null_mut();
    }

    let text = match unsafe { CStr::from_ptr(toml_ptr).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in config parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    match StoreConfig::from_toml_str(text) {
        Ok(config) => open_store_ptr(&config.with_env_overrides()),
        Err(e) => {
            warn!("Rejected store configuration: {e}");
            std::ptr::null_mut()
        }
    }
}

fn open_store_ptr(config: &StoreConfig) -> *mut CommerceStore {
    match open_store(config) {
        Ok(store) => {
            info!("✅ Store initialized successfully");
            Box::into_raw(Box::new(store))
        }
        Err(e) => {
            warn!("❌ Failed to initialize store at {}: {e}", config.storage_path);
            std::ptr::null_mut()
        }
    }
}

/// Flips `id` in the favorites set.
///
/// # Parameters
///
/// * `state` - Store pointer from [`create_store`]
/// * `id` - A null-terminated C string containing the book identifier
///
/// # Returns
///
/// `Ok` wrapping `{"id": .., "active": bool}`, where `active` tells whether
/// the book is a favorite afterwards. `BadRequest` for null or invalid input.
///
/// # Safety
///
/// `state` must be null or a live pointer from [`create_store`]; `id` must be
/// null or a valid null-terminated string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn toggle_favorite(state: *mut CommerceStore, id: *const c_char) -> *const c_char {
    let store = match store_ref(state, "toggle_favorite") {
        Ok(store) => store,
        Err(err) => return err,
    };
    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let active = store.toggle_favorite(&id);
    json_ok(&ToggleResult { id: &id, active })
}

/// Flips `id` in the saved-for-later set.
///
/// # Parameters
///
/// * `state` - Store pointer from [`create_store`]
/// * `id` - A null-terminated C string containing the book identifier
///
/// # Returns
///
/// Same shape as [`toggle_favorite`].
///
/// # Safety
///
/// Same requirements as [`toggle_favorite`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn toggle_saved(state: *mut CommerceStore, id: *const c_char) -> *const c_char {
    let store = match store_ref(state, "toggle_saved") {
        Ok(store) => store,
        Err(err) => return err,
    };
    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let active = store.toggle_saved(&id);
    json_ok(&ToggleResult { id: &id, active })
}

/// Adds one copy of the JSON item to the cart.
///
/// # JSON Format
///
/// ```json
/// { "id": "zyTCAlFPjgYC", "title": "The Google Story", "price": 23.99, "image": "https://..." }
/// ```
///
/// `price` may also be a string such as `"23.99"`.
///
/// # Parameters
///
/// * `state` - Store pointer from [`create_store`]
/// * `json_ptr` - A null-terminated C string containing the item JSON
///
/// # Returns
///
/// `Ok` wrapping `{"applied": bool, "totals": {..}}`. An item without `id` is
/// ignored and answered with `"applied": false`. `SerializationError` for
/// malformed JSON, `BadRequest` for null or invalid pointers.
///
/// # Safety
///
/// `state` must be null or a live store pointer; `json_ptr` must be null or a
/// valid null-terminated string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn add_to_cart(state: *mut CommerceStore, json_ptr: *const c_char) -> *const c_char {
    let store = match store_ref(state, "add_to_cart") {
        Ok(store) => store,
        Err(err) => return err,
    };
    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let item: CartItem = match serde_json::from_str(&json_str) {
        Ok(item) => item,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid cart item JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    let applied = store.add_to_cart(item);
    json_ok(&CartMutationResult { applied, totals: store.cart_totals() })
}

/// Removes the cart line for `id`.
///
/// # Parameters
///
/// * `state` - Store pointer from [`create_store`]
/// * `id` - A null-terminated C string containing the book identifier
///
/// # Returns
///
/// `Ok` wrapping `{"applied": bool, "totals": {..}}`; `applied` is `false`
/// when there was no such line.
///
/// # Safety
///
/// Same requirements as [`toggle_favorite`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn remove_from_cart(state: *mut CommerceStore, id: *const c_char) -> *const c_char {
    let store = match store_ref(state, "remove_from_cart") {
        Ok(store) => store,
        Err(err) => return err,
    };
    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let applied = store.remove_from_cart(&id);
    json_ok(&CartMutationResult { applied, totals: store.cart_totals() })
}

/// Sets the quantity of a cart line.
///
/// # Parameters
///
/// * `state` - Store pointer from [`create_store`]
/// * `id` - A null-terminated C string containing the book identifier
/// * `quantity` - The new quantity
///
/// # Returns
///
/// `Ok` wrapping `{"applied": bool, "totals": {..}}`. Quantities below one,
/// unknown ids and unchanged quantities answer `"applied": false` and leave
/// the cart as it was.
///
/// # Safety
///
/// Same requirements as [`toggle_favorite`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn update_quantity(
    state: *mut CommerceStore,
    id: *const c_char,
    quantity: i64,
) -> *const c_char {
    let store = match store_ref(state, "update_quantity") {
        Ok(store) => store,
        Err(err) => return err,
    };
    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let applied = store.update_quantity(&id, quantity);
    json_ok(&CartMutationResult { applied, totals: store.cart_totals() })
}

/// Answers the full `{favorites, saved, cart}` snapshot.
///
/// # Safety
///
/// `state` must be null or a live pointer from [`create_store`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_snapshot(state: *mut CommerceStore) -> *const c_char {
    match store_ref(state, "get_snapshot") {
        Ok(store) => json_ok(&store.snapshot()),
        Err(err) => err,
    }
}

/// Answers `{item_count, total_price, total_display}`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_cart_totals(state: *mut CommerceStore) -> *const c_char {
    match store_ref(state, "get_cart_totals") {
        Ok(store) => json_ok(&store.cart_totals()),
        Err(err) => err,
    }
}

/// Registers `callback` for change notifications.
///
/// # Parameters
///
/// * `state` - Store pointer from [`create_store`]
/// * `callback` - Called after every mutation with a JSON [`StoreChange`]; the
///   string is only valid for the duration of the call
///
/// # Returns
///
/// `Ok` wrapping `{"subscription_id": n}`, or `BadRequest` for a null state or
/// callback.
///
/// # Safety
///
/// `callback` may run on whichever thread performs the mutation and must not
/// free the string it receives.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn subscribe_changes(
    state: *mut CommerceStore,
    callback: Option<extern "C" fn(*const c_char)>,
) -> *const c_char {
    let store = match store_ref(state, "subscribe_changes") {
        Ok(store) => store,
        Err(err) => return err,
    };
    let callback = match callback {
        Some(callback) => callback,
        None => {
            let error = AppResponse::BadRequest("Null callback passed to subscribe_changes".to_string());
            return response_to_c_string(&error);
        }
    };

    let subscription_id = store.subscribe(move |change| {
        let payload = match serde_json::to_string(change) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialize change notification: {e}");
                return;
            }
        };
        match CString::new(payload) {
            Ok(c_str) => callback(c_str.as_ptr()),
            Err(e) => warn!("Change notification contains a NUL byte: {e}"),
        }
    });

    json_ok(&SubscriptionResult { subscription_id })
}

/// Removes a callback registered with [`subscribe_changes`].
///
/// # Returns
///
/// `Ok` when the subscription existed, `NotFound` otherwise.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn unsubscribe_changes(state: *mut CommerceStore, subscription_id: u64) -> *const c_char {
    let store = match store_ref(state, "unsubscribe_changes") {
        Ok(store) => store,
        Err(err) => return err,
    };

    let response = if store.unsubscribe(subscription_id) {
        AppResponse::success(format!("Subscription {subscription_id} removed"))
    } else {
        AppResponse::NotFound(format!("No subscription with id: {subscription_id}"))
    };
    response_to_c_string(&response)
}

/// Clears favorites, saved and cart, and deletes the stored snapshot.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn reset_store(state: *mut CommerceStore) -> *const c_char {
    let store = match store_ref(state, "reset_store") {
        Ok(store) => store,
        Err(err) => return err,
    };

    store.reset();
    response_to_c_string(&AppResponse::success("Store was reset successfully"))
}

/// Releases a handle returned by [`create_store`]. The live store closes once
/// its last handle is released.
///
/// # Safety
///
/// `state` must come from [`create_store`] or [`create_store_from_config`]
/// and must not be used afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(state: *mut CommerceStore) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    drop(unsafe { Box::from_raw(state) });
    response_to_c_string(&AppResponse::success("Store closed successfully"))
}

/// Frees a string previously returned by this library. Null is ignored.
///
/// # Safety
///
/// `ptr` must have been returned by this library and not freed before.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr as *mut c_char) });
}

fn store_ref<'a>(state: *mut CommerceStore, fn_name: &str) -> Result<&'a CommerceStore, *const c_char> {
    match unsafe { state.as_ref() } {
        Some(store) => Ok(store),
        None => {
            let error = AppResponse::BadRequest(format!("Null state pointer passed to {fn_name}"));
            Err(response_to_c_string(&error))
        }
    }
}

/// Wraps `value` as JSON inside an `AppResponse::Ok`.
fn json_ok<T: Serialize>(value: &T) -> *const c_char {
    match serde_json::to_string(value) {
        Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
        Err(e) => {
            let error = AppResponse::from(e);
            response_to_c_string(&error)
        }
    }
}

/// Serializes `response` to a heap C string owned by the caller.
///
/// Returns null if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to an owned `String`, or to a ready-made
/// `BadRequest` response for null pointers and invalid UTF-8.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
