//! XML `appSettings` documents.
//!
//! ```xml
//! <configuration>
//!   <appSettings>
//!     <add key="ApiClient.ClientId" value="..." />
//!   </appSettings>
//! </configuration>
//! ```
//!
//! The parsed event stream is kept as-is and replayed on save. Only entries
//! whose value changed are re-encoded, and new entries are appended to the
//! `appSettings` section (created under the root if missing). Everything else
//! in the file is written back untouched.

use super::{AttributeDocument, DocumentLoader};
use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const SETTINGS_ELEMENT: &[u8] = b"appSettings";
const ENTRY_ELEMENT: &[u8] = b"add";
const KEY_ATTRIBUTE: &[u8] = b"key";
const VALUE_ATTRIBUTE: &[u8] = b"value";
const BOM: &str = "\u{feff}";

/// Event that closes an element: either its `End` or its self-closing tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Close(usize),
    SelfClosing(usize),
}

impl Anchor {
    fn index(self) -> usize {
        match self {
            Anchor::Close(index) | Anchor::SelfClosing(index) => index,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SettingsState {
    Missing,
    Open,
    Found(Anchor),
}

/// XML configuration document with an `appSettings` key/value section.
#[derive(Debug, Clone)]
pub struct XmlAttributeDocument {
    /// The file started with a UTF-8 byte order mark.
    bom: bool,
    events: Vec<Event<'static>>,
    root: Anchor,
    settings: Option<Anchor>,
    /// Event index of each `<add>` entry and the key it carries.
    entries: Vec<(usize, String)>,
    /// Values as read from the file, first occurrence per key.
    loaded: HashMap<String, String>,
    values: HashMap<String, String>,
    /// Keys set after load that the file did not contain, in insertion order.
    appended: Vec<String>,
}

impl XmlAttributeDocument {
    /// Parses a document from XML text.
    pub fn parse(content: &str) -> Result<Self> {
        let (bom, content) = match content.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, content),
        };
        let mut reader = Reader::from_str(content);
        let mut events = Vec::new();
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut root = None;
        let mut settings = SettingsState::Missing;
        let mut entries = Vec::new();
        let mut loaded = HashMap::new();

        loop {
            let event = reader
                .read_event()
                .with_context(|| format!("Malformed XML at byte {}", reader.buffer_position()))?;
            let index = events.len();

            match &event {
                Event::Eof => break,
                Event::Start(element) | Event::Empty(element) => {
                    let self_closing = matches!(event, Event::Empty(_));
                    let name = element.name().as_ref().to_vec();
                    let depth = stack.len();

                    if depth == 0 {
                        if root.is_some() {
                            bail!("Document has more than one root element");
                        }
                        if self_closing {
                            root = Some(Anchor::SelfClosing(index));
                        }
                    }

                    if depth == 1 && name == SETTINGS_ELEMENT {
                        if let SettingsState::Missing = settings {
                            settings = if self_closing {
                                SettingsState::Found(Anchor::SelfClosing(index))
                            } else {
                                SettingsState::Open
                            };
                        }
                    }

                    if depth == 2 && name == ENTRY_ELEMENT && matches!(settings, SettingsState::Open) {
                        if let Some((key, value)) = read_entry(element)? {
                            loaded.entry(key.clone()).or_insert(value);
                            entries.push((index, key));
                        }
                    }

                    if !self_closing {
                        stack.push(name);
                    }
                }
                Event::End(_) => {
                    stack.pop();
                    match stack.len() {
                        0 => root = Some(Anchor::Close(index)),
                        1 if matches!(settings, SettingsState::Open) => {
                            settings = SettingsState::Found(Anchor::Close(index));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }

            events.push(event.into_owned());
        }

        if !stack.is_empty() {
            bail!("Unclosed element <{}>", String::from_utf8_lossy(&stack[stack.len() - 1]));
        }
        let Some(root) = root else {
            bail!("Document has no root element");
        };
        let settings = match settings {
            SettingsState::Found(anchor) => Some(anchor),
            _ => None,
        };

        Ok(Self {
            bom,
            events,
            root,
            settings,
            entries,
            values: loaded.clone(),
            loaded,
            appended: Vec::new(),
        })
    }

    /// Reads and parses the document at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let document = Self::parse(&content)?;
        debug!(path = %path.display(), entries = document.loaded.len(), "Loaded configuration document");
        Ok(document)
    }

    /// Serializes the document, including every unknown element and entry.
    pub fn render(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        if self.bom {
            writer.get_mut().extend_from_slice(BOM.as_bytes());
        }
        let changed: HashMap<usize, &str> = self
            .entries
            .iter()
            .filter_map(|(index, key)| {
                let value = self.values.get(key)?;
                (self.loaded.get(key) != Some(value)).then_some((*index, value.as_str()))
            })
            .collect();

        let anchor = self.settings.unwrap_or(self.root);
        let needs_insert = !self.appended.is_empty();
        let deferred = match anchor {
            Anchor::Close(index) if needs_insert => self.trailing_whitespace(index),
            _ => None,
        };

        for (index, event) in self.events.iter().enumerate() {
            if Some(index) == deferred.map(|(at, _)| at) {
                continue;
            }

            if needs_insert && index == anchor.index() {
                self.write_insertion(&mut writer, event, deferred.map(|(_, text)| text))?;
                continue;
            }

            match (event, changed.get(&index)) {
                (Event::Empty(element), Some(value)) => {
                    writer
                        .write_event(Event::Empty(with_value(element, value)?))
                        .context("Failed to write configuration entry")?;
                }
                (Event::Start(element), Some(value)) => {
                    writer
                        .write_event(Event::Start(with_value(element, value)?))
                        .context("Failed to write configuration entry")?;
                }
                _ => writer
                    .write_event(event.clone())
                    .context("Failed to write configuration document")?,
            }
        }

        String::from_utf8(writer.into_inner()).context("Rendered configuration is not UTF-8")
    }

    /// Whitespace text directly before the event at `index`.
    fn trailing_whitespace(&self, index: usize) -> Option<(usize, &BytesText<'static>)> {
        let previous = index.checked_sub(1)?;
        match &self.events[previous] {
            Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => Some((previous, text)),
            _ => None,
        }
    }

    /// Writes the appended entries in place of the anchor event.
    fn write_insertion(
        &self,
        writer: &mut Writer<Vec<u8>>,
        anchor_event: &Event<'static>,
        closing_text: Option<&BytesText<'static>>,
    ) -> Result<()> {
        let wrap = self.settings.is_none();
        // Depth of the element being closed at the anchor.
        let depth = if wrap { 0 } else { 1 };

        let closing = match anchor_event {
            Event::Empty(element) => {
                writer
                    .write_event(Event::Start(element.clone()))
                    .context("Failed to write configuration document")?;
                BytesEnd::new(String::from_utf8_lossy(element.name().as_ref()).into_owned())
            }
            Event::End(end) => end.clone(),
            _ => bail!("Unexpected anchor event in configuration document"),
        };

        if wrap {
            write_text(writer, &indent(1))?;
            writer
                .write_event(Event::Start(BytesStart::new("appSettings")))
                .context("Failed to write appSettings section")?;
        }
        for key in &self.appended {
            if let Some(value) = self.values.get(key) {
                write_text(writer, &indent(2))?;
                let mut entry = BytesStart::new("add");
                entry.push_attribute(("key", key.as_str()));
                entry.push_attribute(("value", value.as_str()));
                writer
                    .write_event(Event::Empty(entry))
                    .context("Failed to write configuration entry")?;
            }
        }
        if wrap {
            write_text(writer, &indent(1))?;
            writer
                .write_event(Event::End(BytesEnd::new("appSettings")))
                .context("Failed to write appSettings section")?;
        }

        match closing_text {
            Some(text) => writer
                .write_event(Event::Text(text.clone()))
                .context("Failed to write configuration document")?,
            None => write_text(writer, &indent(depth))?,
        }
        writer
            .write_event(Event::End(closing))
            .context("Failed to write configuration document")?;
        Ok(())
    }
}

impl AttributeDocument for XmlAttributeDocument {
    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: &str) {
        if !self.values.contains_key(key) {
            self.appended.push(key.to_string());
        }
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Writes to a `.tmp` sibling of the real file, syncs it, then renames it
    /// over that file.
    ///
    /// Symlinks are followed so the link keeps pointing at the updated file,
    /// and the existing file's permissions carry over to the replacement.
    fn save(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        let target = resolve_target(path)?;
        let tmp_path = tmp_sibling(&target)?;
        let permissions = match fs::metadata(&target) {
            Ok(metadata) => Some(metadata.permissions()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to stat {}", target.display()))
            }
        };

        {
            let mut tmp_file = File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            if let Some(permissions) = permissions {
                fs::set_permissions(&tmp_path, permissions).with_context(|| {
                    format!("Failed to copy permissions onto {}", tmp_path.display())
                })?;
            }
            tmp_file
                .write_all(rendered.as_bytes())
                .context("Failed to write configuration data")?;
            tmp_file
                .sync_all()
                .context("Failed to sync configuration file to disk")?;
        }

        fs::rename(&tmp_path, &target).with_context(|| {
            format!("Failed to replace {} with {}", target.display(), tmp_path.display())
        })?;

        debug!(path = %path.display(), bytes = rendered.len(), "Saved configuration document");
        Ok(())
    }
}

/// Loads [`XmlAttributeDocument`]s from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDocumentLoader;

impl DocumentLoader for XmlDocumentLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn AttributeDocument>> {
        Ok(Box::new(XmlAttributeDocument::load(path)?))
    }
}

/// Extracts `(key, value)` from an `<add>` element. Entries without a key are
/// ignored; a missing value reads as empty.
fn read_entry(element: &BytesStart<'_>) -> Result<Option<(String, String)>> {
    let mut key = None;
    let mut value = String::new();

    for attribute in element.attributes() {
        let attribute = attribute.context("Malformed attribute on <add> entry")?;
        match attribute.key.as_ref() {
            KEY_ATTRIBUTE => {
                key = Some(attribute.unescape_value().context("Invalid key")?.into_owned());
            }
            VALUE_ATTRIBUTE => {
                value = attribute.unescape_value().context("Invalid value")?.into_owned();
            }
            _ => {}
        }
    }

    Ok(key.map(|key| (key, value)))
}

/// Copy of `element` with its `value` attribute replaced, other attributes
/// kept in order.
fn with_value(element: &BytesStart<'_>, value: &str) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut rewritten = BytesStart::new(name);
    let mut replaced = false;

    for attribute in element.attributes() {
        let attribute = attribute.context("Malformed attribute on <add> entry")?;
        if attribute.key.as_ref() == VALUE_ATTRIBUTE {
            rewritten.push_attribute(("value", value));
            replaced = true;
        } else {
            rewritten.push_attribute(attribute);
        }
    }
    if !replaced {
        rewritten.push_attribute(("value", value));
    }

    Ok(rewritten.into_owned())
}

/// The file a save should replace: `path` with symlinks resolved, or `path`
/// itself when it does not exist yet.
fn resolve_target(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(target) => Ok(target),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(path.to_path_buf()),
        Err(err) => Err(err).with_context(|| format!("Failed to resolve {}", path.display())),
    }
}

/// `apiclient.config` -> `apiclient.config.tmp`, in the same directory.
fn tmp_sibling(target: &Path) -> Result<PathBuf> {
    let Some(name) = target.file_name() else {
        bail!("{} does not name a file", target.display());
    };
    let mut tmp_name = name.to_os_string();
    tmp_name.push(".tmp");
    Ok(target.with_file_name(tmp_name))
}

fn write_text(writer: &mut Writer<Vec<u8>>, text: &str) -> Result<()> {
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .context("Failed to write configuration document")?;
    Ok(())
}

fn indent(depth: usize) -> String {
    format!("\n{}", "  ".repeat(depth))
}
