#![deny(rust_2018_idioms)]

pub mod error;
pub mod field;
pub mod html;
pub mod i18n;
pub mod io;
pub mod options;
pub mod sync;
pub mod wait;

pub use error::{FieldError, SyncError};
pub use field::{FieldId, FieldPath, FieldTree, FormEvent, FormHost, Redraw, Semantics, locate};
pub use html::{HtmlDecoder, TextContent};
pub use i18n::{Localizer, Translations};
pub use io::{
    DocumentFormat, OutputDestination, OutputOptions, emit, parse_document_str, read_document,
    render,
};
pub use options::{FieldPaths, SyncOptions};
pub use sync::{PointerRelease, Synchronizer, SynchronizerBuilder, derive_title};
pub use wait::{AwaitOutcome, ChildWait, RetryPolicy, await_child};

pub mod prelude {
    pub use super::field::{
        Changeable, EventSource, FieldNode, Listable, Validate, ValueHolder,
    };
    pub use super::{
        FieldId, FieldTree, FormEvent, FormHost, SyncOptions, Synchronizer, locate,
    };
}
