//! Media nodes: attributes, uploads, resizing and alignment.
//!
//! A media node is atomic. Everything about it lives in its attributes, so
//! every operation here is an attribute replacement and merges like any
//! other concurrent attribute write.
//!
//! Uploads are two-phase. [`begin_upload`] inserts a placeholder carrying an
//! `uploadId` and `status = uploading`; [`finish_upload`] finds the node by
//! that id (its path may have moved in the meantime) and fills in `src`, or
//! marks it failed. Failed uploads stay failed until the user retries.
//!
//! The request itself runs in [`send_upload`], which never touches the
//! editor, so typing continues while bytes are in flight:
//!
//! ```ignore
//! let id = begin_upload(&mut editor, &parent, index, alt)?;
//! let result = send_upload(&uploader, &bytes).await;
//! finish_upload(&mut editor, &id, result)?;
//! ```

use std::future::Future;
use std::str::FromStr;

use mime_sniffer::MimeTypeSniffer;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use thiserror::Error;

use crate::document::NodePath;
use crate::handle::EditorHandle;
use crate::node::{AttrValue, Attrs, Node, NodeType};
use crate::schema::SchemaViolation;

pub const ATTR_SRC: &str = "src";
pub const ATTR_ALT: &str = "alt";
pub const ATTR_WIDTH: &str = "width";
pub const ATTR_ALIGNMENT: &str = "alignment";
pub const ATTR_UPLOAD_ID: &str = "uploadId";
pub const ATTR_STATUS: &str = "status";

/// Horizontal placement of a media node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
    /// Wider than the text column.
    Wide,
}

impl Alignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Wide => "wide",
        }
    }
}

impl FromStr for Alignment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Alignment::Left),
            "center" => Ok(Alignment::Center),
            "right" => Ok(Alignment::Right),
            "wide" => Ok(Alignment::Wide),
            _ => Err(()),
        }
    }
}

/// Upload state of a media node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Uploading,
    Ready,
    Failed,
}

impl MediaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaStatus::Uploading => "uploading",
            MediaStatus::Ready => "ready",
            MediaStatus::Failed => "failed",
        }
    }
}

impl FromStr for MediaStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(MediaStatus::Uploading),
            "ready" => Ok(MediaStatus::Ready),
            "failed" => Ok(MediaStatus::Failed),
            _ => Err(()),
        }
    }
}

/// Typed view of a media node's attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaAttrs {
    pub src: Option<SmolStr>,
    pub alt: Option<SmolStr>,
    /// Display width in CSS pixels; `None` is natural size.
    pub width: Option<u32>,
    pub alignment: Alignment,
    pub upload_id: Option<SmolStr>,
    /// `None` for media that never went through an upload (embedded URLs).
    pub status: Option<MediaStatus>,
}

impl MediaAttrs {
    /// Read the attributes of a node. Unknown or malformed values fall back
    /// to their defaults.
    pub fn from_node(node: &Node) -> Self {
        let text = |key: &str| node.attr(key).and_then(AttrValue::as_str).map(SmolStr::from);
        Self {
            src: text(ATTR_SRC),
            alt: text(ATTR_ALT),
            width: node
                .attr(ATTR_WIDTH)
                .and_then(AttrValue::as_int)
                .and_then(|w| u32::try_from(w).ok()),
            alignment: text(ATTR_ALIGNMENT)
                .and_then(|a| a.parse().ok())
                .unwrap_or_default(),
            upload_id: text(ATTR_UPLOAD_ID),
            status: text(ATTR_STATUS).and_then(|s| s.parse().ok()),
        }
    }

    pub fn to_attrs(&self) -> Attrs {
        let mut attrs = Attrs::new();
        attrs.insert(ATTR_SRC.into(), self.src.clone().into());
        attrs.insert(ATTR_ALT.into(), self.alt.clone().into());
        attrs.insert(ATTR_WIDTH.into(), self.width.into());
        attrs.insert(ATTR_ALIGNMENT.into(), self.alignment.as_str().into());
        attrs.insert(ATTR_UPLOAD_ID.into(), self.upload_id.clone().into());
        attrs.insert(
            ATTR_STATUS.into(),
            self.status.map(MediaStatus::as_str).into(),
        );
        attrs
    }

    pub fn into_node(self) -> Node {
        let mut node = Node::media();
        node.attrs = self.to_attrs();
        node
    }
}

/// Why an upload did not produce a URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UploadFailure {
    #[error("upload rejected: {0}")]
    Rejected(SmolStr),

    #[error("upload failed: {0}")]
    Network(SmolStr),

    #[error("{size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported media type {0}")]
    Unsupported(SmolStr),
}

/// Uploads media bytes somewhere and returns the URL they are served from.
pub trait MediaUploader {
    fn upload<'a>(
        &'a self,
        data: &'a [u8],
        mime_type: &'a str,
    ) -> impl Future<Output = Result<SmolStr, UploadFailure>> + 'a;
}

/// Best-effort MIME type from the leading bytes.
pub fn sniff_mime_type(data: &[u8]) -> SmolStr {
    data.sniff_mime_type()
        .unwrap_or("application/octet-stream")
        .into()
}

/// The media node at `path`.
fn media_at<'d>(ed: &'d dyn EditorHandle, path: &NodePath) -> Result<&'d Node, SchemaViolation> {
    let node = ed
        .document()
        .node(path)
        .ok_or_else(|| SchemaViolation::InvalidPath(path.as_slice().to_vec()))?;
    if node.node_type != NodeType::Media {
        return Err(SchemaViolation::WrongNodeType {
            expected: NodeType::Media,
            found: node.node_type,
        });
    }
    Ok(node)
}

/// Path of the media node carrying `upload_id`.
pub fn find_upload(ed: &dyn EditorHandle, upload_id: &str) -> Option<NodePath> {
    ed.document().find_node(|n| {
        n.node_type == NodeType::Media
            && n.attr(ATTR_UPLOAD_ID).and_then(AttrValue::as_str) == Some(upload_id)
    })
}

/// Insert an uploading placeholder and return its upload id.
pub fn begin_upload(
    ed: &mut dyn EditorHandle,
    parent: &NodePath,
    index: usize,
    alt: Option<&str>,
) -> Result<SmolStr, SchemaViolation> {
    let upload_id = format_smolstr!("upload-{:016x}", rand::random::<u64>());
    let placeholder = MediaAttrs {
        alt: alt.map(SmolStr::from),
        upload_id: Some(upload_id.clone()),
        status: Some(MediaStatus::Uploading),
        ..MediaAttrs::default()
    };
    ed.insert_node(parent, index, placeholder.into_node())?;
    tracing::debug!(%upload_id, "media placeholder inserted");
    Ok(upload_id)
}

/// Record the outcome of an upload on its placeholder.
///
/// Returns `Ok(false)` if the placeholder no longer exists (deleted locally
/// or by a collaborator while the upload ran).
pub fn finish_upload(
    ed: &mut dyn EditorHandle,
    upload_id: &str,
    result: Result<SmolStr, UploadFailure>,
) -> Result<bool, SchemaViolation> {
    let Some(path) = find_upload(ed, upload_id) else {
        tracing::debug!(upload_id, "upload finished for a removed placeholder");
        return Ok(false);
    };
    match result {
        Ok(src) => {
            ed.set_attribute(&path, ATTR_SRC, src.into())?;
            ed.set_attribute(&path, ATTR_STATUS, MediaStatus::Ready.as_str().into())?;
        }
        Err(failure) => {
            tracing::warn!(upload_id, %failure, "media upload failed");
            ed.set_attribute(&path, ATTR_STATUS, MediaStatus::Failed.as_str().into())?;
        }
    }
    Ok(true)
}

/// Sniff the MIME type and run the upload.
pub async fn send_upload<U: MediaUploader>(
    uploader: &U,
    data: &[u8],
) -> Result<SmolStr, UploadFailure> {
    let mime_type = sniff_mime_type(data);
    tracing::debug!(%mime_type, bytes = data.len(), "uploading media");
    uploader.upload(data, &mime_type).await
}

/// Put a failed upload back into the `uploading` state so it can be sent
/// again. Returns `Ok(false)` for anything that is not a failed upload.
pub fn retry_upload(ed: &mut dyn EditorHandle, upload_id: &str) -> Result<bool, SchemaViolation> {
    let Some(path) = find_upload(ed, upload_id) else {
        return Ok(false);
    };
    if MediaAttrs::from_node(media_at(ed, &path)?).status != Some(MediaStatus::Failed) {
        return Ok(false);
    }
    ed.set_attribute(&path, ATTR_STATUS, MediaStatus::Uploading.as_str().into())?;
    Ok(true)
}

/// Set the display width; `None` restores natural size.
pub fn resize(
    ed: &mut dyn EditorHandle,
    path: &NodePath,
    width: Option<u32>,
) -> Result<(), SchemaViolation> {
    media_at(ed, path)?;
    ed.set_attribute(path, ATTR_WIDTH, width.into())
}

pub fn align(
    ed: &mut dyn EditorHandle,
    path: &NodePath,
    alignment: Alignment,
) -> Result<(), SchemaViolation> {
    media_at(ed, path)?;
    ed.set_attribute(path, ATTR_ALIGNMENT, alignment.as_str().into())
}

pub fn set_alt(
    ed: &mut dyn EditorHandle,
    path: &NodePath,
    alt: Option<&str>,
) -> Result<(), SchemaViolation> {
    media_at(ed, path)?;
    ed.set_attribute(path, ATTR_ALT, alt.into())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::document::{Document, DocumentEdit};
    use crate::handle::PlainEditor;

    struct FakeUploader {
        fail: Cell<bool>,
        calls: Cell<usize>,
    }

    impl FakeUploader {
        fn new(fail: bool) -> Self {
            Self {
                fail: Cell::new(fail),
                calls: Cell::new(0),
            }
        }
    }

    impl MediaUploader for FakeUploader {
        async fn upload<'a>(
            &'a self,
            data: &'a [u8],
            mime_type: &'a str,
        ) -> Result<SmolStr, UploadFailure> {
            self.calls.set(self.calls.get() + 1);
            if self.fail.get() {
                return Err(UploadFailure::Network("connection reset".into()));
            }
            Ok(format_smolstr!("https://cdn.test/{}/{}", mime_type, data.len()))
        }
    }

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn media(ed: &PlainEditor, path: &NodePath) -> MediaAttrs {
        MediaAttrs::from_node(ed.document().node(path).unwrap())
    }

    #[test]
    fn test_attrs_round_trip_through_node() {
        let attrs = MediaAttrs {
            src: Some("https://x/y.png".into()),
            alt: Some("a cat".into()),
            width: Some(480),
            alignment: Alignment::Wide,
            upload_id: None,
            status: Some(MediaStatus::Ready),
        };
        assert_eq!(MediaAttrs::from_node(&attrs.clone().into_node()), attrs);
    }

    #[test]
    fn test_sniff_png() {
        assert_eq!(sniff_mime_type(PNG), "image/png");
    }

    #[tokio::test]
    async fn test_upload_success_fills_src() {
        let mut ed = PlainEditor::new(Document::new());
        let uploader = FakeUploader::new(false);
        let id = begin_upload(&mut ed, &NodePath::root(), 2, Some("logo")).unwrap();
        let result = send_upload(&uploader, PNG).await;
        assert!(finish_upload(&mut ed, &id, result).unwrap());

        let path = find_upload(&ed, &id).unwrap();
        let attrs = media(&ed, &path);
        assert_eq!(attrs.status, Some(MediaStatus::Ready));
        assert_eq!(attrs.src.as_deref(), Some("https://cdn.test/image/png/16"));
        assert_eq!(attrs.alt.as_deref(), Some("logo"));
    }

    #[tokio::test]
    async fn test_editing_continues_while_upload_in_flight() {
        let mut ed = PlainEditor::new(Document::new());
        let uploader = FakeUploader::new(false);
        let id = begin_upload(&mut ed, &NodePath::root(), 2, None).unwrap();

        let pending = send_upload(&uploader, PNG);
        ed.apply(DocumentEdit::InsertText {
            path: NodePath::from(vec![1]),
            offset: 0,
            text: "typed meanwhile".into(),
        })
        .unwrap();
        let result = pending.await;

        assert!(finish_upload(&mut ed, &id, result).unwrap());
        assert_eq!(
            ed.document().children()[1].text_content(),
            Some("typed meanwhile")
        );
        assert_eq!(media(&ed, &NodePath::from(vec![2])).status, Some(MediaStatus::Ready));
    }

    #[tokio::test]
    async fn test_upload_failure_then_explicit_retry() {
        let mut ed = PlainEditor::new(Document::new());
        let uploader = FakeUploader::new(true);
        let id = begin_upload(&mut ed, &NodePath::root(), 2, None).unwrap();
        let result = send_upload(&uploader, PNG).await;
        finish_upload(&mut ed, &id, result).unwrap();
        let path = find_upload(&ed, &id).unwrap();
        assert_eq!(media(&ed, &path).status, Some(MediaStatus::Failed));
        assert_eq!(media(&ed, &path).src, None);
        assert_eq!(uploader.calls.get(), 1);

        uploader.fail.set(false);
        assert!(retry_upload(&mut ed, &id).unwrap());
        assert_eq!(media(&ed, &path).status, Some(MediaStatus::Uploading));
        let result = send_upload(&uploader, PNG).await;
        finish_upload(&mut ed, &id, result).unwrap();
        assert_eq!(media(&ed, &path).status, Some(MediaStatus::Ready));
        assert_eq!(uploader.calls.get(), 2);

        // Ready nodes are not retried.
        assert!(!retry_upload(&mut ed, &id).unwrap());
    }

    #[test]
    fn test_finish_locates_moved_placeholder() {
        let mut ed = PlainEditor::new(Document::new());
        let id = begin_upload(&mut ed, &NodePath::root(), 2, None).unwrap();
        // Content inserted above shifts the placeholder.
        ed.insert_node(&NodePath::root(), 1, Node::paragraph("above"))
            .unwrap();
        assert!(finish_upload(&mut ed, &id, Ok("https://x/1".into())).unwrap());
        let attrs = media(&ed, &NodePath::from(vec![3]));
        assert_eq!(attrs.src.as_deref(), Some("https://x/1"));
    }

    #[test]
    fn test_finish_after_placeholder_deleted() {
        let mut ed = PlainEditor::new(Document::new());
        let id = begin_upload(&mut ed, &NodePath::root(), 2, None).unwrap();
        ed.delete_node(&NodePath::from(vec![2])).unwrap();
        assert!(!finish_upload(&mut ed, &id, Ok("https://x/1".into())).unwrap());
    }

    #[test]
    fn test_resize_and_align() {
        let mut ed = PlainEditor::new(Document::new());
        ed.insert_node(&NodePath::root(), 2, Node::media()).unwrap();
        let path = NodePath::from(vec![2]);
        resize(&mut ed, &path, Some(320)).unwrap();
        align(&mut ed, &path, Alignment::Left).unwrap();
        let attrs = media(&ed, &path);
        assert_eq!(attrs.width, Some(320));
        assert_eq!(attrs.alignment, Alignment::Left);

        assert!(matches!(
            resize(&mut ed, &NodePath::from(vec![1]), Some(10)),
            Err(SchemaViolation::WrongNodeType { .. })
        ));
    }
}
