//! Slot-map keys for every entity kind the [`crate::registry::Registry`] stores.
//!
//! Grounded on `ivy-resources`' `Handle<T>` (a typed wrapper around a `slotmap::Key`), simplified
//! to one concrete key type per entity kind instead of a generic `Handle<T>` — this crate only
//! ever stores five fixed entity kinds, so a generic handle type buys nothing over
//! `slotmap::new_key_type!`.

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a raw GPU buffer (C2) stored in the [`crate::registry::Registry`].
    pub struct BufferHandle;
    /// Handle to a raw GPU image (C2) stored in the [`crate::registry::Registry`].
    pub struct ImageHandle;
    /// Handle to a sampler (C2) stored in the [`crate::registry::Registry`].
    pub struct SamplerHandle;
    /// Handle to a typed region ([`crate::dat::Dat`], C5).
    pub struct DatHandle;
    /// Handle to a texture ([`crate::tex::Tex`], C6).
    pub struct TexHandle;
}
