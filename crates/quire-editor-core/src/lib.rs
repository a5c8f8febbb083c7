//! quire-editor-core: document model and editing logic without framework
//! or network dependencies.
//!
//! This crate provides:
//! - The closed node set and the document grammar (`node`, `schema`)
//! - `Document` with schema-checked typed edits and linear positions
//! - Node-boundary arrow-key navigation and the title/subtitle Enter contract
//! - `EditorHandle`, editor actions and the slash-command registry
//! - The media node extension (attributes, two-phase uploads)

pub mod actions;
pub mod commands;
pub mod derived;
pub mod document;
pub mod execute;
pub mod handle;
pub mod keymap;
pub mod media;
pub mod navigation;
pub mod node;
pub mod position;
pub mod schema;
pub mod types;

pub use actions::{EditorAction, Range};
pub use commands::{CommandRegistry, SlashCommand};
pub use derived::first_meaningful_paragraph;
pub use document::{Document, DocumentEdit, DocumentLoadError, Leaf, NodePath};
pub use execute::execute_action;
pub use handle::{EditorHandle, PlainEditor};
pub use keymap::{EnterPlan, handle_enter};
pub use media::{Alignment, MediaAttrs, MediaStatus, MediaUploader, UploadFailure};
pub use navigation::{HardBreakLayout, LineLayout, NavigationController, NavigationOutcome};
pub use node::{AttrValue, Attrs, ContentKind, Node, NodeContent, NodeType, is_node_atomic};
pub use position::TextPosition;
pub use schema::SchemaViolation;
pub use smol_str::SmolStr;
pub use types::{Direction, EditorKey, EditorSelection, Selection, SnapDirection};
