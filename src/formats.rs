//! Format sniffing, text extraction, and container enumeration.
//!
//! This is the pure, stateless decoder layer: given a file on disk it
//! identifies the format from content signatures (never the file name),
//! extracts plain UTF-8 text where the format has any, and enumerates the
//! members of container formats as materialized temporary files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::DecodeError;

/// Maximum decompressed bytes read from a single office XML entry
/// (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum bytes materialized for a single archive member.
const MAX_MEMBER_BYTES: u64 = 256 * 1024 * 1024;

/// A recognized document format.
///
/// Everything else is uninteresting: skipped without error and never
/// persisted or recursed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Pdf,
    Docx,
    Pptx,
    Odt,
    Odp,
    Html,
    Zip,
    Tar,
}

impl Kind {
    /// Containers have members instead of text.
    pub fn is_container(self) -> bool {
        matches!(self, Kind::Zip | Kind::Tar)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Pdf => "pdf",
            Kind::Docx => "docx",
            Kind::Pptx => "pptx",
            Kind::Odt => "odt",
            Kind::Odp => "odp",
            Kind::Html => "html",
            Kind::Zip => "zip",
            Kind::Tar => "tar",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sniffs the format from file contents: magic bytes first, then zip
/// container inspection for office signatures, then a tar header probe.
///
/// Unreadable or unrecognized files both come back as `None`.
pub fn sniff(path: &Path) -> Option<Kind> {
    let mut prefix = [0u8; 512];
    let mut f = File::open(path).ok()?;
    let read = f.read(&mut prefix).ok()?;
    if read < 4 {
        return None;
    }
    let prefix = &prefix[..read];

    if prefix.starts_with(b"%PDF") {
        return Some(Kind::Pdf);
    }

    if is_html(prefix) {
        return Some(Kind::Html);
    }

    if let Ok(f) = File::open(path) {
        if let Ok(mut archive) = zip::ZipArchive::new(f) {
            return sniff_zip(&mut archive);
        }
    }

    if is_tar(path) {
        return Some(Kind::Tar);
    }

    None
}

/// HTML is recognized by its leading markup, ignoring a BOM and leading
/// whitespace.
fn is_html(prefix: &[u8]) -> bool {
    let without_bom = prefix.strip_prefix(b"\xef\xbb\xbf").unwrap_or(prefix);
    let text = String::from_utf8_lossy(without_bom);
    let head = text.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Office packages are zip files distinguished by well-known members:
/// OpenDocument carries a `mimetype` entry, OOXML a `[Content_Types].xml`.
/// A zip with neither is treated as a plain archive.
fn sniff_zip(archive: &mut zip::ZipArchive<File>) -> Option<Kind> {
    if archive.index_for_name("mimetype").is_some() {
        let mut mimetype = String::new();
        archive
            .by_name("mimetype")
            .ok()?
            .read_to_string(&mut mimetype)
            .ok()?;
        return match mimetype.trim() {
            "application/vnd.oasis.opendocument.presentation" => Some(Kind::Odp),
            "application/vnd.oasis.opendocument.text" => Some(Kind::Odt),
            _ => None,
        };
    }

    if archive.index_for_name("[Content_Types].xml").is_some() {
        if archive.index_for_name("word/document.xml").is_some() {
            return Some(Kind::Docx);
        }
        if archive.index_for_name("ppt/presentation.xml").is_some() {
            return Some(Kind::Pptx);
        }
        return None;
    }

    Some(Kind::Zip)
}

/// Probes for a ustar header (magic at offset 257).
fn is_tar(path: &Path) -> bool {
    let mut header = [0u8; 512];
    let Ok(mut f) = File::open(path) else {
        return false;
    };
    if f.read_exact(&mut header).is_err() {
        return false;
    }
    &header[257..262] == b"ustar"
}

/// Extracts plain text for the sniffed kind. `Ok(None)` means the kind has
/// no text representation (containers).
pub fn extract_text(path: &Path, kind: Kind) -> Result<Option<String>, DecodeError> {
    match kind {
        Kind::Pdf => extract_pdf(path).map(Some),
        Kind::Docx => extract_docx(path).map(Some),
        Kind::Pptx => extract_pptx(path).map(Some),
        Kind::Odt | Kind::Odp => extract_odx(path).map(Some),
        Kind::Html => extract_html(path).map(Some),
        Kind::Zip | Kind::Tar => Ok(None),
    }
}

fn extract_html(path: &Path) -> Result<String, DecodeError> {
    let bytes = std::fs::read(path)?;
    Ok(render_html(&String::from_utf8_lossy(&bytes)))
}

/// Tags whose content never reaches the rendered page.
const INVISIBLE_TAGS: &[&str] = &["script", "style", "head", "noscript", "template"];
/// Tags that end a line of rendered text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "dl", "dt", "dd", "h1", "h2", "h3", "h4", "h5", "h6",
    "tr", "table", "section", "article", "header", "footer", "blockquote", "pre", "form",
    "fieldset", "hr",
];

/// Renders HTML markup to plain text: block tags break lines, invisible
/// subtrees and comments are dropped, runs of whitespace collapse, and the
/// common character entities are decoded. Deliberately lenient; real CMS
/// output is rarely well formed.
fn render_html(html: &str) -> String {
    let mut out = String::new();
    let mut rest = html;
    let mut invisible: Option<&'static str> = None;

    while let Some(lt) = rest.find('<') {
        let (text, after) = rest.split_at(lt);
        if invisible.is_none() {
            push_text(&mut out, text);
        }

        if after.starts_with("<!--") {
            rest = match after.find("-->") {
                Some(end) => &after[end + 3..],
                None => "",
            };
            continue;
        }

        let Some(gt) = after.find('>') else { break };
        let tag_body = &after[1..gt];
        rest = &after[gt + 1..];

        let closing = tag_body.starts_with('/');
        let name: String = tag_body
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        if let Some(open) = invisible {
            if closing && name == open {
                invisible = None;
            }
            continue;
        }
        if !closing && INVISIBLE_TAGS.contains(&name.as_str()) && !tag_body.ends_with('/') {
            invisible = INVISIBLE_TAGS.iter().find(|t| **t == name).copied();
            continue;
        }
        if BLOCK_TAGS.contains(&name.as_str()) && !out.is_empty() && !out.ends_with('\n') {
            // Trailing spaces before a block break are rendering artifacts.
            while out.ends_with(' ') {
                out.pop();
            }
            out.push('\n');
        }
    }
    if invisible.is_none() {
        push_text(&mut out, rest);
    }
    while out.ends_with(' ') || out.ends_with('\n') {
        out.pop();
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Appends character data with entities decoded and whitespace collapsed.
fn push_text(out: &mut String, text: &str) {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        append_collapsed(out, &rest[..amp]);
        let tail = &rest[amp..];
        match decode_entity(tail) {
            Some((decoded, consumed)) => {
                if decoded.is_whitespace() {
                    append_collapsed(out, " ");
                } else {
                    out.push(decoded);
                }
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    append_collapsed(out, rest);
}

fn append_collapsed(out: &mut String, text: &str) {
    for c in text.chars() {
        if c.is_whitespace() {
            if !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n') {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
}

/// Decodes one entity at the start of `text` (which begins with `&`).
/// Returns the character and the number of bytes consumed.
fn decode_entity(text: &str) -> Option<(char, usize)> {
    let semi = text[..text.len().min(12)].find(';')?;
    let body = &text[1..semi];
    let decoded = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        _ => {
            let code = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)?
        }
    };
    Some((decoded, semi + 1))
}

fn extract_pdf(path: &Path) -> Result<String, DecodeError> {
    pdf_extract::extract_text(path).map_err(|e| DecodeError::Pdf(e.to_string()))
}

fn read_zip_entry(path: &Path, name: &str) -> Result<Vec<u8>, DecodeError> {
    let archive_name = path.display().to_string();
    let f = File::open(path)?;
    let mut archive = zip::ZipArchive::new(f).map_err(|e| DecodeError::Archive {
        name: archive_name.clone(),
        message: e.to_string(),
    })?;
    let entry = archive.by_name(name).map_err(|e| DecodeError::Archive {
        name: archive_name.clone(),
        message: format!("{}: {}", name, e),
    })?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(DecodeError::Archive {
            name: archive_name,
            message: format!("{} exceeds size limit", name),
        });
    }
    Ok(out)
}

/// Collects the character data of `<t>` elements, one line per closed
/// paragraph. Works for both WordprocessingML (`w:t`/`w:p`) and DrawingML
/// (`a:t`/`a:p`) because only local names are matched.
fn extract_t_elements(xml: &[u8], entry: &str) -> Result<String, DecodeError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(DecodeError::Xml {
                    entry: entry.to_string(),
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_docx(path: &Path) -> Result<String, DecodeError> {
    let xml = read_zip_entry(path, "word/document.xml")?;
    extract_t_elements(&xml, "word/document.xml")
}

fn extract_pptx(path: &Path) -> Result<String, DecodeError> {
    let archive_name = path.display().to_string();
    let f = File::open(path)?;
    let archive = zip::ZipArchive::new(f).map_err(|e| DecodeError::Archive {
        name: archive_name,
        message: e.to_string(),
    })?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    drop(archive);

    let mut out = String::new();
    for name in slide_names {
        let xml = read_zip_entry(path, &name)?;
        let text = extract_t_elements(&xml, &name)?;
        out.push_str(&text);
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}

/// OpenDocument text/presentation content. Character data sits directly in
/// paragraph elements; whitespace elements are explicit markup, and
/// tracked-changes and page-number subtrees carry text that was never part
/// of the visible document.
fn extract_odx(path: &Path) -> Result<String, DecodeError> {
    let xml = read_zip_entry(path, "content.xml")?;
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if skip_depth > 0 {
                    skip_depth += 1;
                } else if matches!(name.as_ref(), b"tracked-changes" | b"page-number") {
                    skip_depth = 1;
                }
            }
            Ok(quick_xml::events::Event::Empty(e)) => {
                if skip_depth == 0 {
                    match e.local_name().as_ref() {
                        b"s" => out.push(' '),
                        b"tab" => out.push('\t'),
                        b"line-break" => out.push('\n'),
                        _ => {}
                    }
                }
            }
            Ok(quick_xml::events::Event::Text(te)) => {
                if skip_depth == 0 {
                    out.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else if matches!(e.local_name().as_ref(), b"p" | b"h")
                    && !out.ends_with('\n')
                    && !out.is_empty()
                {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(DecodeError::Xml {
                    entry: "content.xml".to_string(),
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Where a member's bytes sit inside its container.
#[derive(Debug, Clone, Copy)]
enum Locator {
    Zip(usize),
    Tar(usize),
}

/// One container member: metadata only, no bytes. The bytes are copied out
/// by [`materialize_member`], one member at a time, so a large archive
/// never occupies temp space for more than the member under work.
#[derive(Debug)]
pub struct Member {
    pub name: String,
    pub mtime: i64,
    locator: Locator,
}

/// Enumerates the file members of a container without extracting anything.
/// Non-file members (directories, links) are skipped.
pub fn list_members(path: &Path, kind: Kind) -> Result<Vec<Member>, DecodeError> {
    match kind {
        Kind::Zip => list_zip_members(path),
        Kind::Tar => list_tar_members(path),
        _ => Ok(Vec::new()),
    }
}

fn list_zip_members(path: &Path) -> Result<Vec<Member>, DecodeError> {
    let archive_name = path.display().to_string();
    let f = File::open(path)?;
    let mut archive = zip::ZipArchive::new(f).map_err(|e| DecodeError::Archive {
        name: archive_name.clone(),
        message: e.to_string(),
    })?;

    let mut out = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| DecodeError::Archive {
            name: archive_name.clone(),
            message: e.to_string(),
        })?;
        if entry.is_dir() {
            continue;
        }
        out.push(Member {
            name: base_name(entry.name()),
            mtime: entry
                .last_modified()
                .and_then(zip_datetime_to_unix)
                .unwrap_or(0),
            locator: Locator::Zip(i),
        });
    }
    Ok(out)
}

fn list_tar_members(path: &Path) -> Result<Vec<Member>, DecodeError> {
    let archive_name = path.display().to_string();
    let f = File::open(path)?;
    let mut archive = tar::Archive::new(f);
    let entries = archive.entries().map_err(|e| DecodeError::Archive {
        name: archive_name.clone(),
        message: e.to_string(),
    })?;

    let mut out = Vec::new();
    for (i, entry) in entries.enumerate() {
        let entry = entry.map_err(|e| DecodeError::Archive {
            name: archive_name.clone(),
            message: e.to_string(),
        })?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();
        out.push(Member {
            name,
            mtime: entry.header().mtime().unwrap_or(0) as i64,
            locator: Locator::Tar(i),
        });
    }
    Ok(out)
}

/// Copies one member's bytes into a temporary file carrying the member's
/// recorded mtime. The caller owns the file; dropping it deletes it.
pub fn materialize_member(path: &Path, member: &Member) -> Result<NamedTempFile, DecodeError> {
    let archive_name = path.display().to_string();
    let file = match member.locator {
        Locator::Zip(index) => {
            let f = File::open(path)?;
            let mut archive = zip::ZipArchive::new(f).map_err(|e| DecodeError::Archive {
                name: archive_name.clone(),
                message: e.to_string(),
            })?;
            let entry = archive.by_index(index).map_err(|e| DecodeError::Archive {
                name: archive_name.clone(),
                message: format!("{}: {}", member.name, e),
            })?;
            materialize(entry, &archive_name, &member.name)?
        }
        Locator::Tar(index) => {
            let f = File::open(path)?;
            let mut archive = tar::Archive::new(f);
            let entries = archive.entries().map_err(|e| DecodeError::Archive {
                name: archive_name.clone(),
                message: e.to_string(),
            })?;
            let mut found = None;
            for (i, entry) in entries.enumerate() {
                let entry = entry.map_err(|e| DecodeError::Archive {
                    name: archive_name.clone(),
                    message: e.to_string(),
                })?;
                if i == index {
                    found = Some(materialize(entry, &archive_name, &member.name)?);
                    break;
                }
            }
            found.ok_or_else(|| DecodeError::Archive {
                name: archive_name.clone(),
                message: format!("{} vanished from archive", member.name),
            })?
        }
    };
    set_mtime(&file, member.mtime);
    Ok(file)
}

fn materialize<R: Read>(
    reader: R,
    archive_name: &str,
    member: &str,
) -> Result<NamedTempFile, DecodeError> {
    let mut file = NamedTempFile::new()?;
    let copied = std::io::copy(&mut reader.take(MAX_MEMBER_BYTES), file.as_file_mut())?;
    if copied >= MAX_MEMBER_BYTES {
        return Err(DecodeError::Archive {
            name: archive_name.to_string(),
            message: format!("{} exceeds member size limit", member),
        });
    }
    Ok(file)
}

fn set_mtime(file: &NamedTempFile, mtime: i64) {
    // Best effort: a zero/unknown member mtime only means the child looks
    // stale, which is safe.
    let _ = filetime::set_file_mtime(file.path(), filetime::FileTime::from_unix_time(mtime, 0));
}

fn base_name(member_path: &str) -> String {
    member_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(member_path)
        .to_string()
}

fn zip_datetime_to_unix(dt: zip::DateTime) -> Option<i64> {
    let date = chrono::NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)?;
    let dt = date.and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)?;
    Some(dt.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_with(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn zip_with(entries: &[(&str, &[u8])]) -> NamedTempFile {
        let f = NamedTempFile::new().unwrap();
        let mut w = zip::ZipWriter::new(f.reopen().unwrap());
        for (name, data) in entries {
            w.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            w.write_all(data).unwrap();
        }
        w.finish().unwrap();
        f
    }

    const DOC_XML: &[u8] = br#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>alpha bravo</w:t></w:r></w:p>
    <w:p><w:r><w:t>charlie</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    #[test]
    fn sniff_pdf_magic() {
        let f = temp_with(b"%PDF-1.4 rest of file");
        assert_eq!(sniff(f.path()), Some(Kind::Pdf));
    }

    #[test]
    fn sniff_unrecognized_and_short_files() {
        assert_eq!(sniff(temp_with(b"plain text content").path()), None);
        assert_eq!(sniff(temp_with(b"ab").path()), None);
    }

    #[test]
    fn sniff_docx_and_plain_zip() {
        let docx = zip_with(&[
            ("[Content_Types].xml", b"<Types/>" as &[u8]),
            ("word/document.xml", DOC_XML),
        ]);
        assert_eq!(sniff(docx.path()), Some(Kind::Docx));

        let plain = zip_with(&[("readme.txt", b"hello" as &[u8])]);
        assert_eq!(sniff(plain.path()), Some(Kind::Zip));
    }

    #[test]
    fn sniff_odt_by_mimetype() {
        let odt = zip_with(&[
            ("mimetype", b"application/vnd.oasis.opendocument.text" as &[u8]),
            ("content.xml", b"<office:document-content/>"),
        ]);
        assert_eq!(sniff(odt.path()), Some(Kind::Odt));
    }

    #[test]
    fn sniff_zip_with_unknown_mimetype_is_unrecognized() {
        let f = zip_with(&[("mimetype", b"application/epub+zip" as &[u8])]);
        assert_eq!(sniff(f.path()), None);
    }

    #[test]
    fn docx_text_has_one_line_per_paragraph() {
        let docx = zip_with(&[
            ("[Content_Types].xml", b"<Types/>" as &[u8]),
            ("word/document.xml", DOC_XML),
        ]);
        let text = extract_text(docx.path(), Kind::Docx).unwrap().unwrap();
        assert_eq!(text, "alpha bravo\ncharlie\n");
    }

    #[test]
    fn odt_whitespace_markup_is_expanded() {
        let content = br#"<?xml version="1.0"?>
<office:document-content xmlns:office="o" xmlns:text="t">
  <office:body><office:text>
    <text:p>one<text:s/>two</text:p>
    <text:tracked-changes><text:p>hidden edit</text:p></text:tracked-changes>
    <text:h>heading</text:h>
  </office:text></office:body>
</office:document-content>"#;
        let odt = zip_with(&[
            ("mimetype", b"application/vnd.oasis.opendocument.text" as &[u8]),
            ("content.xml", content),
        ]);
        let text = extract_text(odt.path(), Kind::Odt).unwrap().unwrap();
        assert_eq!(text, "one two\nheading\n");
    }

    #[test]
    fn containers_have_no_text() {
        let f = zip_with(&[("readme.txt", b"hello" as &[u8])]);
        assert_eq!(extract_text(f.path(), Kind::Zip).unwrap(), None);
    }

    #[test]
    fn zip_members_are_listed_without_extraction() {
        let f = zip_with(&[
            ("docs/inner.txt", b"inner content" as &[u8]),
            ("other.bin", b"\x00\x01"),
        ]);
        let members = list_members(f.path(), Kind::Zip).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, "inner.txt");

        let file = materialize_member(f.path(), &members[0]).unwrap();
        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(data, b"inner content");
    }

    #[test]
    fn tar_members_carry_their_recorded_mtime() {
        let f = NamedTempFile::new().unwrap();
        let mut builder = tar::Builder::new(f.reopen().unwrap());
        let data = b"tar member body";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mtime(1_700_000_000);
        header.set_cksum();
        builder.append_data(&mut header, "dir/member.txt", &data[..]).unwrap();
        builder.finish().unwrap();
        drop(builder);

        assert_eq!(sniff(f.path()), Some(Kind::Tar));
        let members = list_members(f.path(), Kind::Tar).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "member.txt");
        assert_eq!(members[0].mtime, 1_700_000_000);

        let file = materialize_member(f.path(), &members[0]).unwrap();
        let meta = std::fs::metadata(file.path()).unwrap();
        let on_disk = meta
            .modified()
            .unwrap()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        assert_eq!(on_disk, 1_700_000_000);
    }

    #[test]
    fn sniff_html_by_leading_markup() {
        let doc = temp_with(b"<!DOCTYPE html>\n<html><body>hi</body></html>");
        assert_eq!(sniff(doc.path()), Some(Kind::Html));
        let bare = temp_with(b"  <html lang=\"en\"><body>hi</body></html>");
        assert_eq!(sniff(bare.path()), Some(Kind::Html));
        let fragment = temp_with(b"<div>not a full page</div>");
        assert_eq!(sniff(fragment.path()), None);
    }

    #[test]
    fn html_blocks_become_lines_and_scripts_vanish() {
        let html = r#"<!DOCTYPE html>
<html><head><title>ignored</title><script>var x = "hidden";</script></head>
<body>
  <h1>Contact &amp; Support</h1>
  <p>Call us
     any time.</p>
  <ul><li>First</li><li>Second&nbsp;item</li></ul>
  <!-- a comment -->
  <style>.c { color: red }</style>
</body></html>"#;
        assert_eq!(
            render_html(html),
            "Contact & Support\nCall us any time.\nFirst\nSecond item\n"
        );
    }

    #[test]
    fn html_entities_are_decoded() {
        assert_eq!(render_html("<html><body><p>a &lt;b&gt; &#233; &#x41;</p></body></html>"),
            "a <b> \u{e9} A\n");
        // Unknown or unterminated entities pass through literally.
        assert_eq!(render_html("<html><body>AT&T &bogus;</body></html>"), "AT&T &bogus;\n");
    }

    #[test]
    fn corrupt_office_file_is_an_error() {
        let f = zip_with(&[("[Content_Types].xml", b"<Types/>" as &[u8])]);
        // Sniffs as neither docx nor pptx, but force the extraction path.
        assert!(extract_text(f.path(), Kind::Docx).is_err());
    }
}
