//! Stubs and spies over application-exposed objects.
//!
//! Applications publish their replaceable platform objects as
//! [`MethodTable`]s. A [`StubRegistry`] swaps methods on those tables,
//! records every invocation and puts the originals back at teardown.

pub mod registry;
pub mod table;

pub use registry::{StubBehavior, StubCall, StubHandle, StubRegistry};
pub use table::{Arg, Callback, Method, MethodTable};
