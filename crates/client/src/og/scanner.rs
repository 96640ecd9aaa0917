//! Forward-only tag scanner over a chunked HTML byte stream.
//!
//! The scanner drives html5ever's tokenizer directly, without building a
//! tree. Handlers are registered per tag name, rewriter style, and receive
//! callbacks in document order while the stream is consumed:
//!
//! - `element` for every start tag with a matching name,
//! - `text` / `comment` while a matching non-void element is open,
//! - `end_tag` when that element's closing tag is seen.
//!
//! Chunks can be split anywhere, including inside a multi-byte UTF-8
//! sequence or in the middle of a tag; the tokenizer keeps its state between
//! writes. Nothing is buffered beyond what the tokenizer needs for the token
//! in progress.

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use ogproxy_core::OpenGraphData;

/// Elements that never have content or an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

/// Borrowed view of a start tag.
pub struct Element<'a> {
    tag: &'a Tag,
}

impl Element<'_> {
    /// Lowercase tag name.
    pub fn name(&self) -> &str {
        &self.tag.name
    }

    /// Raw value of an attribute. Names are matched lowercase, as the
    /// tokenizer lowercases them.
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.tag
            .attrs
            .iter()
            .find(|attr| &*attr.name.local == name)
            .map(|attr| &*attr.value)
    }

    pub fn is_self_closing(&self) -> bool {
        self.tag.self_closing
    }
}

/// Callbacks for one registered tag name.
///
/// Every callback gets exclusive access to the record being built.
pub trait ElementHandler {
    fn element(&mut self, element: &Element<'_>, data: &mut OpenGraphData);

    fn text(&mut self, _text: &str, _data: &mut OpenGraphData) {}

    fn comment(&mut self, _comment: &str, _data: &mut OpenGraphData) {}

    fn end_tag(&mut self, _data: &mut OpenGraphData) {}
}

struct Registration {
    tag: &'static str,
    handler: Box<dyn ElementHandler>,
}

struct Sink {
    registrations: Vec<Registration>,
    /// Registrations whose element is currently open, innermost last.
    open: Vec<usize>,
    data: OpenGraphData,
}

impl TokenSink for Sink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => return self.tag(&tag),
            Token::CharacterTokens(text) => self.text(&text),
            Token::CommentToken(comment) => self.comment(&comment),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

impl Sink {
    fn tag(&mut self, tag: &Tag) -> TokenSinkResult<()> {
        match tag.kind {
            TagKind::StartTag => {
                let element = Element { tag };
                // A trailing `/` only closes void elements; `<script/>` still has content.
                let has_content = !VOID_ELEMENTS.iter().any(|void| *void == &*tag.name);
                for (idx, registration) in self.registrations.iter_mut().enumerate() {
                    if registration.tag != &*tag.name {
                        continue;
                    }
                    registration.handler.element(&element, &mut self.data);
                    if has_content {
                        self.open.push(idx);
                    }
                }

                // The tree builder normally switches the tokenizer into raw
                // text modes; without one the sink has to.
                match raw_text_kind(&tag.name) {
                    Some(kind) => TokenSinkResult::RawData(kind),
                    None => TokenSinkResult::Continue,
                }
            }
            TagKind::EndTag => {
                for idx in 0..self.registrations.len() {
                    if self.registrations[idx].tag != &*tag.name {
                        continue;
                    }
                    if let Some(pos) = self.open.iter().rposition(|&open| open == idx) {
                        self.open.remove(pos);
                        self.registrations[idx].handler.end_tag(&mut self.data);
                    }
                }
                TokenSinkResult::Continue
            }
        }
    }

    fn text(&mut self, text: &str) {
        for &idx in &self.open {
            self.registrations[idx].handler.text(text, &mut self.data);
        }
    }

    fn comment(&mut self, comment: &str) {
        for &idx in &self.open {
            self.registrations[idx].handler.comment(comment, &mut self.data);
        }
    }
}

fn raw_text_kind(name: &str) -> Option<RawKind> {
    match name {
        "script" => Some(RawKind::ScriptData),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        "title" | "textarea" => Some(RawKind::Rcdata),
        _ => None,
    }
}

/// Incremental UTF-8 decoder that carries incomplete sequences across chunks.
#[derive(Debug, Default)]
struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - rest.len();
        self.pending.drain(..consumed);
        out
    }

    /// Flush whatever is left; a truncated trailing sequence becomes U+FFFD.
    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Streaming scanner that feeds registered [`ElementHandler`]s.
///
/// ```ignore
/// let mut scanner = TagScanner::new(data).on("meta", MetaHandler);
/// scanner.write(b"<meta property=\"og:title\" content=\"Hi\">");
/// let data = scanner.end();
/// ```
pub struct TagScanner {
    tokenizer: Tokenizer<Sink>,
    queue: BufferQueue,
    decoder: Utf8Chunker,
}

impl TagScanner {
    /// Create a scanner that accumulates into `data`.
    pub fn new(data: OpenGraphData) -> Self {
        let sink = Sink { registrations: Vec::new(), open: Vec::new(), data };
        Self {
            tokenizer: Tokenizer::new(sink, TokenizerOpts::default()),
            queue: BufferQueue::new(),
            decoder: Utf8Chunker::default(),
        }
    }

    /// Register a handler for elements named `tag` (lowercase).
    pub fn on(mut self, tag: &'static str, handler: impl ElementHandler + 'static) -> Self {
        self.tokenizer
            .sink
            .registrations
            .push(Registration { tag, handler: Box::new(handler) });
        self
    }

    /// Feed the next chunk of the document.
    pub fn write(&mut self, chunk: &[u8]) {
        let text = self.decoder.decode(chunk);
        self.feed(&text);
    }

    /// Signal end of document and hand back the record.
    ///
    /// Elements still open at this point never see their `end_tag`.
    pub fn end(mut self) -> OpenGraphData {
        let rest = self.decoder.finish();
        self.feed(&rest);
        self.tokenizer.end();
        std::mem::take(&mut self.tokenizer.sink.data)
    }

    fn feed(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.queue.push_back(StrTendril::from_slice(text));
        let _ = self.tokenizer.feed(&mut self.queue);
    }
}
