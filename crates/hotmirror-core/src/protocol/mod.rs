//! Hotmirror wire protocol.
//!
//! A host talks to a preview client over one WebSocket connection carrying
//! two kinds of frames:
//!
//! - **Text frames** hold control messages in a tag-delimited grammar:
//!
//! ```text
//! <messagetype>folderchange</messagetype><folder>DIR</folder>
//!     (<file>PATH</file><content>TEXT</content>)* [<currentfile>PATH</currentfile>]
//! <messagetype>filechange</messagetype><file>PATH</file><content>TEXT</content>
//!     [<currentfile>PATH</currentfile>]
//! <messagetype>data</messagetype><json>OPAQUE</json>
//! ```
//!
//! - **Binary frames** hold a zipped project snapshot, see [`frame`].
//!
//! ## Escaping
//!
//! The legacy grammar has no escaping: a value containing its own closing
//! tag is cut short at that point. Messages that start with
//! `<encoding>escaped</encoding>` have `&`, `<` and `>` in every value
//! written as `&amp;`, `&lt;` and `&gt;`, which removes the ambiguity.
//! [`ControlMessage::encode`] always produces the escaped form; the decoder
//! accepts both.

pub mod frame;

use crate::error::{Error, Result};

/// Marker that switches a text frame to entity-escaped values.
pub const ESCAPED_PREFIX: &str = "<encoding>escaped</encoding>";

/// Extract the text between `<tag>` and `</tag>`.
///
/// Both tags are searched from byte offset `from`. Returns `None` when
/// either tag is missing or the closing tag does not come after the opening
/// one, so an absent field is distinguishable from an empty one.
///
/// # Example
///
/// ```
/// use hotmirror_core::protocol::extract_field;
///
/// assert_eq!(extract_field("<a>x</a>", "a", 0), Some("x"));
/// assert_eq!(extract_field("<a></a>", "a", 0), Some(""));
/// assert_eq!(extract_field("<a></b>", "a", 0), None);
/// ```
pub fn extract_field<'a>(message: &'a str, tag: &str, from: usize) -> Option<&'a str> {
    let haystack = message.get(from..)?;
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let begin = haystack.find(&open)?;
    let end = haystack.find(&close)?;
    if end <= begin {
        return None;
    }

    let value_start = begin + open.len();
    if end < value_start {
        return None;
    }
    haystack.get(value_start..end)
}

/// Byte offset just past the first `</tag>` at or after `from`.
fn position_after(message: &str, tag: &str, from: usize) -> Option<usize> {
    let close = format!("</{tag}>");
    message
        .get(from..)?
        .find(&close)
        .map(|idx| from + idx + close.len())
}

/// Kind of a control message, as carried in `<messagetype>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Full or partial refresh of a project folder
    FolderChange,
    /// Single file update
    FileChange,
    /// Opaque JSON forwarded to the UI runtime
    Data,
}

impl MessageKind {
    /// Wire name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FolderChange => "folderchange",
            Self::FileChange => "filechange",
            Self::Data => "data",
        }
    }

    fn from_wire(value: &str) -> Option<Self> {
        match value {
            "folderchange" => Some(Self::FolderChange),
            "filechange" => Some(Self::FileChange),
            "data" => Some(Self::Data),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file's new content as sent by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    /// Path of the file on the host
    pub remote_path: String,
    /// Full text content
    pub content: String,
}

impl FileEdit {
    /// Create a new edit.
    pub fn new(remote_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
            content: content.into(),
        }
    }
}

/// Payload of a folder change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderChange {
    /// Project folder on the host
    pub folder: String,
    /// Files to write, in the order received
    pub edits: Vec<FileEdit>,
    /// File the UI should show next, if the host named one
    pub current_file: Option<String>,
}

/// Payload of a file change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// The file to overwrite
    pub edit: FileEdit,
    /// File the UI should show next, if the host named one
    pub current_file: Option<String>,
}

/// A decoded text control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Refresh a project folder
    FolderChange(FolderChange),
    /// Update a single file
    FileChange(FileChange),
    /// Forward opaque JSON text to the UI runtime
    Data {
        /// JSON text, untouched
        json: String,
    },
}

impl ControlMessage {
    /// The message kind.
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::FolderChange(_) => MessageKind::FolderChange,
            Self::FileChange(_) => MessageKind::FileChange,
            Self::Data { .. } => MessageKind::Data,
        }
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolFieldMissing`] when `messagetype` or a field the
    ///   kind requires is absent
    /// - [`Error::UnknownMessageType`] for a type this client does not handle
    pub fn decode(text: &str) -> Result<Self> {
        let (body, escaped) = text
            .strip_prefix(ESCAPED_PREFIX)
            .map_or((text, false), |rest| (rest, true));
        let fields = Fields { body, escaped };

        let kind_name = fields
            .get("messagetype", 0)
            .ok_or(Error::ProtocolFieldMissing("messagetype"))?;
        let kind = MessageKind::from_wire(&kind_name)
            .ok_or_else(|| Error::UnknownMessageType(kind_name.clone()))?;

        match kind {
            MessageKind::FolderChange => {
                let folder = fields
                    .get("folder", 0)
                    .ok_or(Error::ProtocolFieldMissing("folder"))?
                    .replace('\n', "");
                Ok(Self::FolderChange(FolderChange {
                    folder,
                    edits: fields.file_edits(),
                    current_file: fields.current_file(),
                }))
            }
            MessageKind::FileChange => {
                let remote_path = fields
                    .get("file", 0)
                    .filter(|path| !path.is_empty())
                    .ok_or(Error::ProtocolFieldMissing("file"))?;
                let content = fields
                    .get("content", 0)
                    .ok_or(Error::ProtocolFieldMissing("content"))?;
                Ok(Self::FileChange(FileChange {
                    edit: FileEdit {
                        remote_path,
                        content,
                    },
                    current_file: fields.current_file(),
                }))
            }
            MessageKind::Data => {
                let json = fields
                    .get("json", 0)
                    .ok_or(Error::ProtocolFieldMissing("json"))?;
                Ok(Self::Data { json })
            }
        }
    }

    /// Encode into the escaped text grammar.
    pub fn encode(&self) -> String {
        let mut out = String::from(ESCAPED_PREFIX);
        push_field(&mut out, "messagetype", self.kind().as_str());

        match self {
            Self::FolderChange(change) => {
                push_field(&mut out, "folder", &change.folder);
                for edit in &change.edits {
                    push_field(&mut out, "file", &edit.remote_path);
                    push_field(&mut out, "content", &edit.content);
                }
                if let Some(current) = &change.current_file {
                    push_field(&mut out, "currentfile", current);
                }
            }
            Self::FileChange(change) => {
                push_field(&mut out, "file", &change.edit.remote_path);
                push_field(&mut out, "content", &change.edit.content);
                if let Some(current) = &change.current_file {
                    push_field(&mut out, "currentfile", current);
                }
            }
            Self::Data { json } => push_field(&mut out, "json", json),
        }

        out
    }
}

/// Field reader over one message body.
struct Fields<'a> {
    body: &'a str,
    escaped: bool,
}

impl Fields<'_> {
    fn get(&self, tag: &str, from: usize) -> Option<String> {
        let raw = extract_field(self.body, tag, from)?;
        Some(if self.escaped {
            unescape(raw)
        } else {
            raw.to_string()
        })
    }

    /// Walk `<file>`/`<content>` pairs, moving past each `</content>`.
    fn file_edits(&self) -> Vec<FileEdit> {
        let mut edits = Vec::new();
        let mut cursor = 0;

        loop {
            let Some(remote_path) = self.get("file", cursor) else {
                break;
            };
            if remote_path.is_empty() {
                break;
            }
            let Some(content) = self.get("content", cursor) else {
                tracing::warn!(file = %remote_path, "file entry without content, ignoring rest of message");
                break;
            };
            edits.push(FileEdit {
                remote_path,
                content,
            });

            match position_after(self.body, "content", cursor) {
                Some(next) => cursor = next,
                None => break,
            }
        }

        edits
    }

    fn current_file(&self) -> Option<String> {
        self.get("currentfile", 0).filter(|path| !path.is_empty())
    }
}

fn push_field(out: &mut String, tag: &str, value: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(&escape(value));
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        if let Some(tail) = rest.strip_prefix("&amp;") {
            out.push('&');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("&lt;") {
            out.push('<');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("&gt;") {
            out.push('>');
            rest = tail;
        } else {
            out.push('&');
            rest = &rest[1..];
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_field_basic() {
        assert_eq!(extract_field("<a>x</a>", "a", 0), Some("x"));
        assert_eq!(extract_field("<a></a>", "a", 0), Some(""));
        assert_eq!(extract_field("<a></b>", "a", 0), None);
        assert_eq!(extract_field("no tags", "a", 0), None);
    }

    #[test]
    fn test_extract_field_close_before_open() {
        assert_eq!(extract_field("</a><a>x", "a", 0), None);
    }

    #[test]
    fn test_extract_field_from_offset() {
        let msg = "<f>one</f><f>two</f>";
        assert_eq!(extract_field(msg, "f", 0), Some("one"));
        assert_eq!(extract_field(msg, "f", 10), Some("two"));
        assert_eq!(extract_field(msg, "f", 100), None);
    }

    #[test]
    fn test_extract_field_legacy_truncation() {
        let msg = "<content>a</content>b</content>";
        assert_eq!(extract_field(msg, "content", 0), Some("a"));
    }

    #[test]
    fn test_decode_folder_change() {
        let msg = "<messagetype>folderchange</messagetype><folder>/srv/proj\n</folder>\
                   <file>/srv/proj/a.txt</file><content>hi</content>\
                   <file>/srv/proj/ui/Main.qml</file><content>Item {}</content>\
                   <currentfile>/srv/proj/a.txt</currentfile>";

        let ControlMessage::FolderChange(change) = ControlMessage::decode(msg).unwrap() else {
            panic!("expected folder change");
        };
        assert_eq!(change.folder, "/srv/proj");
        assert_eq!(
            change.edits,
            vec![
                FileEdit::new("/srv/proj/a.txt", "hi"),
                FileEdit::new("/srv/proj/ui/Main.qml", "Item {}"),
            ]
        );
        assert_eq!(change.current_file.as_deref(), Some("/srv/proj/a.txt"));
    }

    #[test]
    fn test_decode_folder_change_without_files() {
        let msg = "<messagetype>folderchange</messagetype><folder>/srv/proj</folder>";
        let ControlMessage::FolderChange(change) = ControlMessage::decode(msg).unwrap() else {
            panic!("expected folder change");
        };
        assert!(change.edits.is_empty());
        assert!(change.current_file.is_none());
    }

    #[test]
    fn test_decode_folder_change_missing_folder() {
        let err = ControlMessage::decode("<messagetype>folderchange</messagetype>").unwrap_err();
        assert!(matches!(err, Error::ProtocolFieldMissing("folder")));
    }

    #[test]
    fn test_decode_file_change() {
        let msg = "<messagetype>filechange</messagetype><file>/srv/proj/a.txt</file>\
                   <content></content>";
        let ControlMessage::FileChange(change) = ControlMessage::decode(msg).unwrap() else {
            panic!("expected file change");
        };
        assert_eq!(change.edit, FileEdit::new("/srv/proj/a.txt", ""));
        assert!(change.current_file.is_none());
    }

    #[test]
    fn test_decode_file_change_missing_file() {
        let msg = "<messagetype>filechange</messagetype><content>x</content>";
        assert!(matches!(
            ControlMessage::decode(msg),
            Err(Error::ProtocolFieldMissing("file"))
        ));
    }

    #[test]
    fn test_decode_data() {
        let msg = r#"<messagetype>data</messagetype><json>{"k":[1,2]}</json>"#;
        assert_eq!(
            ControlMessage::decode(msg).unwrap(),
            ControlMessage::Data {
                json: r#"{"k":[1,2]}"#.to_string()
            }
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = ControlMessage::decode("<messagetype>reboot</messagetype>").unwrap_err();
        assert!(matches!(err, Error::UnknownMessageType(ref t) if t == "reboot"));
        assert!(matches!(
            ControlMessage::decode("hello"),
            Err(Error::ProtocolFieldMissing("messagetype"))
        ));
    }

    #[test]
    fn test_escaped_content_survives_closing_tag() {
        let message = ControlMessage::FolderChange(FolderChange {
            folder: "/srv/proj".to_string(),
            edits: vec![
                FileEdit::new("/srv/proj/doc.xml", "<content>nested</content> & more"),
                FileEdit::new("/srv/proj/b.txt", "second"),
            ],
            current_file: Some("/srv/proj/b.txt".to_string()),
        });

        let encoded = message.encode();
        assert!(encoded.starts_with(ESCAPED_PREFIX));
        assert_eq!(ControlMessage::decode(&encoded).unwrap(), message);
    }

    #[test]
    fn test_unescape_leaves_unknown_entities() {
        assert_eq!(unescape("a &amp; b &copy; &lt;c&gt;"), "a & b &copy; <c>");
        assert_eq!(unescape("trailing &"), "trailing &");
    }
}
