//! Multi-line text where every character can carry its own color and style.
//!
//! A line is a list of styled runs. Restyling one character first isolates
//! it into a run of its own, so its neighbours keep their style. The widget
//! turns its lines into a single [`Primitive`] of glyph quads for the
//! renderer.

use bitflags::bitflags;
use rusttype::Scale;

use crate::primitive::{push_quad, Primitive};
use crate::utils::{Color, Position, Rectangle, Size};

pub const DEFAULT_CHARACTER_SIZE: u32 = 30;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextStyleFlags: u32 {
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
        const UNDERLINED = 1 << 2;
        const STRIKE_THROUGH = 1 << 3;
    }
}

impl TextStyleFlags {
    pub const REGULAR: TextStyleFlags = TextStyleFlags::empty();
}

/// Fill and outline applied to newly pushed text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStroke {
    pub fill: Color,
    pub outline: Color,
    pub thickness: f32,
}

impl Default for TextStroke {
    fn default() -> Self {
        Self {
            fill: Color::WHITE,
            outline: Color::TRANSPARENT,
            thickness: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub stroke: TextStroke,
    pub flags: TextStyleFlags,
    pub character_size: u32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            stroke: TextStroke::default(),
            flags: TextStyleFlags::REGULAR,
            character_size: DEFAULT_CHARACTER_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    text: String,
    style: TextStyle,
}

impl TextRun {
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn with_text(&self, text: &str) -> TextRun {
        TextRun {
            text: text.to_owned(),
            style: self.style,
        }
    }
}

/// Font measurements the rich-text model needs for its bounds.
pub trait FontMetrics {
    /// Distance between two baselines.
    fn line_spacing(&self, character_size: u32) -> f32;

    /// Horizontal advance of `text` set in one style.
    fn text_width(&self, text: &str, character_size: u32, flags: TextStyleFlags) -> f32;
}

/// Glyph placed relative to the pen position at the top of its line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub advance: f32,
    pub bounds: Rectangle,
    /// Source rectangle in atlas pixels.
    pub texture_rect: Rectangle,
}

/// Rasterized glyphs living in the renderer's texture atlas.
pub trait GlyphAtlas: FontMetrics {
    fn glyph(&self, character: char, character_size: u32, flags: TextStyleFlags) -> Option<Glyph>;
}

impl FontMetrics for rusttype::Font<'_> {
    fn line_spacing(&self, character_size: u32) -> f32 {
        let metrics = self.v_metrics(Scale::uniform(character_size as f32));
        metrics.ascent - metrics.descent + metrics.line_gap
    }

    fn text_width(&self, text: &str, character_size: u32, _flags: TextStyleFlags) -> f32 {
        let scale = Scale::uniform(character_size as f32);
        let mut width = 0.0;
        let mut previous = None;
        for glyph in self.glyphs_for(text.chars()) {
            let glyph = glyph.scaled(scale);
            if let Some(previous) = previous {
                width += self.pair_kerning(scale, previous, glyph.id());
            }
            width += glyph.h_metrics().advance_width;
            previous = Some(glyph.id());
        }
        width
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RichLine {
    runs: Vec<TextRun>,
}

impl RichLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn append_run(&mut self, run: TextRun) {
        self.runs.push(run);
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.runs.iter().map(TextRun::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(TextRun::is_empty)
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }

    pub fn character(&self, pos: usize) -> char {
        let (index, local) = self.locate(pos);
        nth_char(&self.runs[index].text, local)
    }

    /// Replaces one character, keeping the style of the run it is in.
    pub fn set_character(&mut self, pos: usize, character: char) {
        let (index, local) = self.locate(pos);
        let run = &mut self.runs[index];
        run.text = run
            .text
            .chars()
            .enumerate()
            .map(|(i, c)| if i == local { character } else { c })
            .collect();
    }

    pub fn character_color(&self, pos: usize) -> Color {
        let (index, _) = self.locate(pos);
        self.runs[index].style.stroke.fill
    }

    pub fn set_character_color(&mut self, pos: usize, color: Color) {
        let index = self.isolate_character(pos);
        self.runs[index].style.stroke.fill = color;
    }

    pub fn character_style(&self, pos: usize) -> TextStyleFlags {
        let (index, _) = self.locate(pos);
        self.runs[index].style.flags
    }

    pub fn set_character_style(&mut self, pos: usize, flags: TextStyleFlags) {
        let index = self.isolate_character(pos);
        self.runs[index].style.flags = flags;
    }

    pub fn set_character_size(&mut self, size: u32) {
        for run in &mut self.runs {
            run.style.character_size = size;
        }
    }

    /// Splits the run holding `pos` so the character sits in a run of its
    /// own, and returns that run's index. Runs of one character are left
    /// alone.
    ///
    /// # Panics
    ///
    /// If `pos` is not less than [`RichLine::len`].
    pub fn isolate_character(&mut self, pos: usize) -> usize {
        let (index, local) = self.locate(pos);
        let len = self.runs[index].len();
        if len == 1 {
            return index;
        }

        let run = self.runs.remove(index);
        let start = byte_offset(&run.text, local);
        let end = byte_offset(&run.text, local + 1);

        let mut pieces = Vec::with_capacity(3);
        if local != 0 {
            pieces.push(run.with_text(&run.text[..start]));
        }
        let isolated = index + pieces.len();
        pieces.push(run.with_text(&run.text[start..end]));
        if local != len - 1 {
            pieces.push(run.with_text(&run.text[end..]));
        }

        self.runs.splice(index..index, pieces);
        isolated
    }

    /// Width is the sum of the runs' widths; height the tallest run's
    /// line spacing, rounded down.
    pub fn size<M: FontMetrics + ?Sized>(&self, metrics: &M) -> Size {
        self.runs.iter().fold(Size::default(), |size, run| {
            let style = &run.style;
            Size {
                width: size.width + metrics.text_width(&run.text, style.character_size, style.flags),
                height: size
                    .height
                    .max(metrics.line_spacing(style.character_size).floor()),
            }
        })
    }

    /// Run index and the position inside that run.
    fn locate(&self, pos: usize) -> (usize, usize) {
        assert!(
            pos < self.len(),
            "character position {} out of range for line of length {}",
            pos,
            self.len()
        );
        let mut local = pos;
        for (index, run) in self.runs.iter().enumerate() {
            let len = run.len();
            if local < len {
                return (index, local);
            }
            local -= len;
        }
        unreachable!("position checked against line length")
    }
}

/// Rich text label content: lines of styled runs plus the style applied to
/// text pushed next.
#[derive(Debug, Clone, PartialEq)]
pub struct RichText {
    lines: Vec<RichLine>,
    character_size: u32,
    current_stroke: TextStroke,
    current_flags: TextStyleFlags,
}

impl Default for RichText {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            character_size: DEFAULT_CHARACTER_SIZE,
            current_stroke: TextStroke::default(),
            current_flags: TextStyleFlags::REGULAR,
        }
    }
}

impl RichText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends text in the current style. The part before the first `'\n'`
    /// continues the last line; every `'\n'` starts a new one.
    pub fn push_str(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }

        let style = self.current_style();
        let mut pieces = text.split('\n');

        if let Some(first) = pieces.next() {
            if self.lines.is_empty() {
                self.lines.push(RichLine::new());
            }
            if let Some(line) = self.lines.last_mut() {
                line.append_run(TextRun::new(first, style));
            }
        }

        for piece in pieces {
            let mut line = RichLine::new();
            line.append_run(TextRun::new(piece, style));
            self.lines.push(line);
        }

        self
    }

    pub fn set_fill(&mut self, color: Color) -> &mut Self {
        self.current_stroke.fill = color;
        self
    }

    pub fn set_outline(&mut self, color: Color, thickness: f32) -> &mut Self {
        self.current_stroke.outline = color;
        self.current_stroke.thickness = thickness;
        self
    }

    pub fn set_stroke(&mut self, stroke: TextStroke) -> &mut Self {
        self.current_stroke = stroke;
        self
    }

    pub fn set_style(&mut self, flags: TextStyleFlags) -> &mut Self {
        self.current_flags = flags;
        self
    }

    pub fn current_style(&self) -> TextStyle {
        TextStyle {
            stroke: self.current_stroke,
            flags: self.current_flags,
            character_size: self.character_size,
        }
    }

    pub fn lines(&self) -> &[RichLine] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(RichLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn character(&self, line: usize, pos: usize) -> char {
        self.line(line).character(pos)
    }

    pub fn set_character(&mut self, line: usize, pos: usize, character: char) {
        self.line_mut(line).set_character(pos, character);
    }

    pub fn character_color(&self, line: usize, pos: usize) -> Color {
        self.line(line).character_color(pos)
    }

    pub fn set_character_color(&mut self, line: usize, pos: usize, color: Color) {
        self.line_mut(line).set_character_color(pos, color);
    }

    pub fn character_style(&self, line: usize, pos: usize) -> TextStyleFlags {
        self.line(line).character_style(pos)
    }

    pub fn set_character_style(&mut self, line: usize, pos: usize, flags: TextStyleFlags) {
        self.line_mut(line).set_character_style(pos, flags);
    }

    pub fn character_size(&self) -> u32 {
        self.character_size
    }

    pub fn set_character_size(&mut self, size: u32) {
        if self.character_size == size {
            return;
        }
        self.character_size = size;
        for line in &mut self.lines {
            line.set_character_size(size);
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Widest line by the sum of all line heights.
    pub fn size<M: FontMetrics + ?Sized>(&self, metrics: &M) -> Size {
        self.lines.iter().fold(Size::default(), |size, line| {
            let line_size = line.size(metrics);
            Size {
                width: size.width.max(line_size.width),
                height: size.height + line_size.height,
            }
        })
    }

    /// One quad per glyph the atlas knows, tinted with its run's fill,
    /// positioned at `origin`. Characters without a glyph are skipped.
    pub fn build_primitive(&self, origin: Position, atlas: &dyn GlyphAtlas) -> Primitive {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut line_top = 0.0;

        for line in &self.lines {
            let mut pen = 0.0;
            for run in line.runs() {
                let style = run.style();
                for character in run.text().chars() {
                    let Some(glyph) = atlas.glyph(character, style.character_size, style.flags)
                    else {
                        continue;
                    };
                    let rect = Rectangle::new(
                        pen + glyph.bounds.x,
                        line_top + glyph.bounds.y,
                        glyph.bounds.width,
                        glyph.bounds.height,
                    );
                    push_quad(
                        &mut vertices,
                        &mut indices,
                        rect,
                        style.stroke.fill,
                        glyph.texture_rect,
                    );
                    pen += glyph.advance;
                }
            }
            line_top += line.size(atlas).height;
        }

        Primitive::new(vertices, indices).with_position(origin)
    }

    fn line(&self, line: usize) -> &RichLine {
        assert!(
            line < self.lines.len(),
            "line {} out of range ({} lines)",
            line,
            self.lines.len()
        );
        &self.lines[line]
    }

    fn line_mut(&mut self, line: usize) -> &mut RichLine {
        assert!(
            line < self.lines.len(),
            "line {} out of range ({} lines)",
            line,
            self.lines.len()
        );
        &mut self.lines[line]
    }
}

fn nth_char(text: &str, n: usize) -> char {
    text.chars().nth(n).unwrap_or_default()
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(offset, _)| offset)
}
