//! Handle identity, lifetime and collection marshaling for liblinphone
//!
//! Generated bindings for liblinphone hand native objects to Rust as
//! [`Wrapper`]s. This crate provides the runtime those bindings sit on:
//!
//! - **Identity**: resolving the same native handle twice while a wrapper is
//!   alive yields wrappers that share one host state. The association lives
//!   in an attachment slot on the native object and is dropped when the
//!   native object is destroyed.
//! - **Lifetime**: a wrapper resolved with `acquire` (or adopted) owns one
//!   native reference and releases it exactly once, on any thread.
//! - **Marshaling**: native lists and `char *` arrays are exposed as lazy
//!   iterators; host sequences are turned into fresh native lists.
//!
//! # Example
//!
//! ```ignore
//! use linphone_bridge::{native_object, Bridge, LinphoneApi};
//!
//! native_object! {
//!     pub struct Call;
//! }
//!
//! let bridge = Bridge::new(LinphoneApi);
//! let call = unsafe { bridge.resolve_owned::<Call>(raw_call.into()) };
//! ```
//!
//! # Features
//!
//! - `linphone`: link against libbellesip and libbctoolbox and expose
//!   [`LinphoneApi`].
//! - `testing`: expose [`testing::SimulatedNative`], an in-process native
//!   heap for downstream tests.

#![warn(missing_docs)]

mod bridge;
mod error;
mod handle;
mod identity;
mod lifetime;
mod marshal;
mod native;
mod object;
mod options;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::Bridge;
pub use error::{BridgeError, Result};
pub use handle::NativeHandle;
pub use lifetime::Reference;
pub use marshal::{string_from_native, ForeignList, ForeignStringArray, ForeignStringList};
#[cfg(feature = "linphone")]
pub use native::LinphoneApi;
pub use native::{DataDestroy, NativeApi};
pub use object::{NativeObject, Wrapper};
pub use options::{BridgeOptions, ATTACHMENT_TAG_ENV, DEFAULT_ATTACHMENT_TAG};
