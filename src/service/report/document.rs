//! Flowing text documents rendered with printpdf.
//!
//! Content is collected as blocks, paginated into positioned lines, then
//! drawn. Text uses an embedded TrueType face when one is available so any
//! script the font covers survives; otherwise the built-in Helvetica pair
//! is used, which only covers Windows-1252.

use std::fs::File;
use std::path::{Path, PathBuf};

use printpdf::{BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference};

use crate::error::ReportError;

// US Letter, millimetres
const PAGE_WIDTH: f32 = 215.9;
const PAGE_HEIGHT: f32 = 279.4;
const MARGIN: f32 = 18.0;
const PT_TO_MM: f32 = 0.352_778;
const LINE_SPACING: f32 = 1.25;
// Advance widths as a fraction of the font size
const NARROW_ADVANCE: f32 = 0.55;
const WIDE_ADVANCE: f32 = 1.0;

const LAYER_NAME: &str = "Content";

/// Sans-serif faces with wide script coverage, tried in order.
const FONT_CANDIDATES: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0x00, 0x00, 0x00);

    fn to_color(self) -> Color {
        Color::Rgb(printpdf::Rgb::new(
            f32::from(self.0) / 255.0,
            f32::from(self.1) / 255.0,
            f32::from(self.2) / 255.0,
            None,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// Font size in points
    pub size: f32,
    pub bold: bool,
    pub color: Rgb,
    pub align: Align,
}

impl TextStyle {
    pub fn new(size: f32) -> Self {
        Self {
            size,
            bold: false,
            color: Rgb::BLACK,
            align: Align::Left,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn centered(mut self) -> Self {
        self.align = Align::Center;
        self
    }

    fn line_height(&self) -> f32 {
        self.size * PT_TO_MM * LINE_SPACING
    }
}

/// Font files for the regular and bold faces. Empty means built-in Helvetica.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontSource {
    regular: Option<PathBuf>,
    bold: Option<PathBuf>,
}

impl FontSource {
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Use `regular`, plus a `<stem>-Bold.<ext>` sibling when one exists.
    pub fn from_file(regular: impl Into<PathBuf>) -> Self {
        let regular = regular.into();
        let bold = bold_sibling(&regular).filter(|p| p.is_file());
        Self {
            regular: Some(regular),
            bold,
        }
    }

    /// The configured font if given, else the first installed candidate.
    pub fn discover(configured: Option<&Path>) -> Self {
        if let Some(path) = configured {
            return Self::from_file(path);
        }
        match FONT_CANDIDATES.iter().map(Path::new).find(|p| p.is_file()) {
            Some(path) => Self::from_file(path),
            None => {
                tracing::warn!(
                    "[REPORT] No TrueType font found; reports fall back to Helvetica (Latin only)"
                );
                Self::builtin()
            }
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.regular.is_none()
    }

    pub fn regular(&self) -> Option<&Path> {
        self.regular.as_deref()
    }
}

fn bold_sibling(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let ext = path.extension()?.to_str()?;
    Some(path.with_file_name(format!("{}-Bold.{}", stem, ext)))
}

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Text { text: String, style: TextStyle },
    /// Vertical gap in points
    Space(f32),
}

/// One line of text at its final position, in millimetres from the
/// bottom-left corner of its page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub style: TextStyle,
}

/// A document under construction, laid out top to bottom.
#[derive(Debug, Clone, Default)]
pub struct FlowDocument {
    title: String,
    blocks: Vec<Block>,
}

impl FlowDocument {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            blocks: Vec::new(),
        }
    }

    pub fn text(&mut self, text: &str, style: TextStyle) {
        self.blocks.push(Block::Text {
            text: text.to_string(),
            style,
        });
    }

    pub fn space(&mut self, points: f32) {
        self.blocks.push(Block::Space(points));
    }

    /// Every text block in order, unwrapped.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Text { text, .. } => Some(text.as_str()),
            Block::Space(_) => None,
        })
    }

    /// Wrap text to the printable width and break it into pages.
    pub fn paginate(&self) -> Vec<Vec<PlacedLine>> {
        let max_width = PAGE_WIDTH - 2.0 * MARGIN;
        let top = PAGE_HEIGHT - MARGIN;

        let mut pages = vec![Vec::new()];
        let mut y = top;

        for block in &self.blocks {
            match block {
                Block::Space(points) => {
                    y -= points * PT_TO_MM;
                    if y < MARGIN {
                        pages.push(Vec::new());
                        y = top;
                    }
                }
                Block::Text { text, style } => {
                    let line_height = style.line_height();
                    for line in wrap(text, max_width, style.size) {
                        if y - line_height < MARGIN {
                            pages.push(Vec::new());
                            y = top;
                        }
                        y -= line_height;
                        let x = match style.align {
                            Align::Left => MARGIN,
                            Align::Center => {
                                ((PAGE_WIDTH - text_width(&line, style.size)) / 2.0).max(MARGIN)
                            }
                        };
                        if let Some(page) = pages.last_mut() {
                            page.push(PlacedLine {
                                text: line,
                                x,
                                y,
                                style: *style,
                            });
                        }
                    }
                }
            }
        }

        // A gap at the very end must not leave a blank trailing page.
        if pages.len() > 1 && pages.last().is_some_and(|p| p.is_empty()) {
            pages.pop();
        }
        pages
    }

    /// Serialize to PDF bytes.
    pub fn render(&self, fonts: &FontSource) -> Result<Vec<u8>, ReportError> {
        let (doc, first_page, first_layer) =
            PdfDocument::new(self.title.as_str(), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), LAYER_NAME);
        let faces = Faces::load(&doc, fonts)?;

        for (index, lines) in self.paginate().iter().enumerate() {
            let (page, layer) = if index == 0 {
                (first_page, first_layer)
            } else {
                doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), LAYER_NAME)
            };
            let layer = doc.get_page(page).get_layer(layer);

            for line in lines {
                let font = if line.style.bold { &faces.bold } else { &faces.regular };
                layer.set_fill_color(line.style.color.to_color());
                layer.use_text(line.text.as_str(), line.style.size, Mm(line.x), Mm(line.y), font);
            }
        }

        doc.save_to_bytes().map_err(|e| ReportError::Pdf(e.to_string()))
    }
}

struct Faces {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl Faces {
    fn load(doc: &PdfDocumentReference, fonts: &FontSource) -> Result<Self, ReportError> {
        let pdf_err = |e: printpdf::Error| ReportError::Pdf(e.to_string());

        match &fonts.regular {
            Some(path) => {
                let regular = doc.add_external_font(File::open(path)?).map_err(pdf_err)?;
                let bold = match &fonts.bold {
                    Some(bold) => doc.add_external_font(File::open(bold)?).map_err(pdf_err)?,
                    None => regular.clone(),
                };
                Ok(Self { regular, bold })
            }
            None => Ok(Self {
                regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?,
                bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?,
            }),
        }
    }
}

/// East Asian wide characters take a full em.
fn is_wide(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1100..=0x115F
            | 0x2E80..=0xA4CF
            | 0xAC00..=0xD7A3
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF00..=0xFF60
            | 0xFFE0..=0xFFE6
    )
}

fn char_width(ch: char, size: f32) -> f32 {
    let advance = if is_wide(ch) { WIDE_ADVANCE } else { NARROW_ADVANCE };
    advance * size * PT_TO_MM
}

/// Estimated width in millimetres.
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().map(|c| char_width(c, size)).sum()
}

/// Greedy word wrap. Words wider than a line are split between characters,
/// which is also how unspaced scripts break.
pub fn wrap(text: &str, max_width: f32, size: f32) -> Vec<String> {
    let space = char_width(' ', size);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut width = 0.0;

        for word in paragraph.split_whitespace() {
            let word_width = text_width(word, size);
            let gap = if line.is_empty() { 0.0 } else { space };

            if width + gap + word_width <= max_width {
                if !line.is_empty() {
                    line.push(' ');
                }
                line.push_str(word);
                width += gap + word_width;
                continue;
            }

            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
                width = 0.0;
            }
            for ch in word.chars() {
                let w = char_width(ch, size);
                if width + w > max_width && !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                    width = 0.0;
                }
                line.push(ch);
                width += w;
            }
        }

        lines.push(line);
    }

    lines
}
