//! Render an answer as a small PDF document.
//!
//! Output is a plain PDF 1.4 file: A4 pages, one paragraph of 10pt Helvetica
//! with 72pt margins, wrapped and paginated. Text is encoded as WinAnsi
//! (Windows-1252); characters it cannot represent become `?`.

use std::fmt::Write as _;

use crate::models::AnswerRecord;

pub const DEFAULT_EXPORT_FILE: &str = "AI_Answer.pdf";

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 72.0;
const FONT_SIZE: f32 = 10.0;
const LEADING: f32 = 12.0;
/// Usable line width in glyph units (1/1000 of the font size).
const LINE_WIDTH: u32 = ((PAGE_WIDTH - 2.0 * MARGIN) * 1000.0 / FONT_SIZE) as u32;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING) as usize;

/// Helvetica advance widths for ASCII 0x20..=0x7E, from the standard AFM metrics.
const ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

/// Widest Latin-1 glyph; used for characters without an entry.
const FALLBACK_WIDTH: u16 = 1000;

/// Render the answer text of `record` as PDF bytes.
pub fn render_answer_pdf(record: &AnswerRecord) -> Vec<u8> {
    render_text_pdf(&record.answer)
}

/// Render `text` as a single flowed paragraph. Line breaks are treated as spaces.
pub fn render_text_pdf(text: &str) -> Vec<u8> {
    let lines = wrap(text, LINE_WIDTH);
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![&lines[..]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    let mut writer = PdfWriter::new();

    // Object numbers: 1 catalog, 2 page tree, 3 font, then (page, content) pairs
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + i * 2).collect();

    writer.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");

    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    writer.object(
        2,
        format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()).as_bytes(),
    );

    writer.object(
        3,
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
    );

    for (page_lines, &page_id) in pages.iter().zip(&page_ids) {
        let content_id = page_id + 1;
        let page = format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        );
        writer.object(page_id, page.as_bytes());

        let stream = content_stream(page_lines);
        let mut body = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        body.extend_from_slice(&stream);
        body.extend_from_slice(b"\nendstream");
        writer.object(content_id, &body);
    }

    writer.finish(1)
}

fn content_stream(lines: &[String]) -> Vec<u8> {
    let mut stream = Vec::new();
    let top = PAGE_HEIGHT - MARGIN - FONT_SIZE;
    stream.extend_from_slice(
        format!("BT\n/F1 {FONT_SIZE} Tf\n{LEADING} TL\n{MARGIN} {top:.2} Td\n").as_bytes(),
    );
    for line in lines {
        stream.push(b'(');
        encode_pdf_string(line, &mut stream);
        stream.extend_from_slice(b") Tj T*\n");
    }
    stream.extend_from_slice(b"ET");
    stream
}

/// Escape a string literal body, mapping each character to one WinAnsi byte.
fn encode_pdf_string(text: &str, out: &mut Vec<u8>) {
    for c in text.chars() {
        match win_ansi_byte(c) {
            Some(b @ (b'(' | b')' | b'\\')) => {
                out.push(b'\\');
                out.push(b);
            }
            Some(b) => out.push(b),
            None => out.push(b'?'),
        }
    }
}

/// Windows-1252 byte for `c`, if it has one.
fn win_ansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        ' '..='~' | '\u{a0}'..='\u{ff}' => c as u32 as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8a,
        '‹' => 0x8b,
        'Œ' => 0x8c,
        'Ž' => 0x8e,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9a,
        '›' => 0x9b,
        'œ' => 0x9c,
        'ž' => 0x9e,
        'Ÿ' => 0x9f,
        _ => return None,
    };
    Some(byte)
}

/// Helvetica advance width of `c` in glyph units.
fn glyph_width(c: char) -> u32 {
    let width = match c {
        ' '..='~' => ASCII_WIDTHS[c as usize - 0x20],
        '‘' | '’' | '‚' => 222,
        '“' | '”' | '„' | '‹' | '›' | 'ˆ' | '˜' => 333,
        '•' => 350,
        '–' | '€' | 'ƒ' | '†' | '‡' => 556,
        'š' | 'ž' => 500,
        // Characters outside WinAnsi are drawn as '?'
        c if win_ansi_byte(c).is_none() => ASCII_WIDTHS[usize::from(b'?') - 0x20],
        _ => FALLBACK_WIDTH,
    };
    u32::from(width)
}

fn text_width(word: &[char]) -> u32 {
    word.iter().copied().map(glyph_width).sum()
}

/// Greedy word wrap to `max_width` glyph units; words wider than a line are split.
fn wrap(text: &str, max_width: u32) -> Vec<String> {
    let space = glyph_width(' ');
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while text_width(&word) > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            let mut fit = 0;
            let mut width = 0;
            while fit < word.len() && width + glyph_width(word[fit]) <= max_width {
                width += glyph_width(word[fit]);
                fit += 1;
            }
            lines.push(word.drain(..fit.max(1)).collect());
        }
        if word.is_empty() {
            continue;
        }

        let word_width = text_width(&word);
        let needed = if current.is_empty() { word_width } else { word_width + space };
        if current_width + needed > max_width {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_width += space;
        }
        current.extend(word.iter());
        current_width += word_width;
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Tracks byte offsets of numbered objects to emit the cross-reference table.
struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<(usize, usize)>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    fn object(&mut self, id: usize, body: &[u8]) {
        self.offsets.push((id, self.buf.len()));
        self.buf.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn finish(mut self, root: usize) -> Vec<u8> {
        self.offsets.sort_unstable();
        let size = self.offsets.len() + 1;
        let xref_offset = self.buf.len();

        let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for (_, offset) in &self.offsets {
            let _ = writeln!(xref, "{offset:010} 00000 n ");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {size} /Root {root} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        );

        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerMode;

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn test_short_answer_single_page() {
        let record = AnswerRecord::new(
            "q",
            "Attention is all you need.",
            10,
            vec![],
            AnswerMode::Question,
        );
        let pdf = as_text(&render_answer_pdf(&record));

        assert!(pdf.starts_with("%PDF-1.4"));
        assert!(pdf.trim_end().ends_with("%%EOF"));
        assert!(pdf.contains("/Count 1"));
        assert!(pdf.contains("(Attention is all you need.) Tj"));
    }

    #[test]
    fn test_long_answer_paginates() {
        let text = "lorem ipsum ".repeat(2000);
        let pdf = as_text(&render_text_pdf(&text));

        let pages = pdf.matches("/Type /Page ").count();
        assert!(pages > 1);
        assert!(pdf.contains(&format!("/Count {pages}")));
    }

    #[test]
    fn test_empty_answer_still_has_a_page() {
        let pdf = as_text(&render_text_pdf(""));
        assert!(pdf.contains("/Count 1"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let bytes = render_text_pdf("hello (world)");
        let pdf = as_text(&bytes);

        let start = pdf.rfind("startxref\n").unwrap() + "startxref\n".len();
        let xref_offset: usize = pdf[start..].lines().next().unwrap().parse().unwrap();
        assert!(pdf[xref_offset..].starts_with("xref"));

        let entries: Vec<usize> = pdf[xref_offset..]
            .lines()
            .skip(3)
            .take_while(|l| l.ends_with(" n "))
            .map(|l| l[..10].parse().unwrap())
            .collect();
        assert_eq!(entries.len(), 5);
        for (i, offset) in entries.iter().enumerate() {
            assert!(pdf[*offset..].starts_with(&format!("{} 0 obj", i + 1)));
        }
    }

    #[test]
    fn test_string_escaping() {
        let mut out = Vec::new();
        encode_pdf_string("a(b)\\c é 漢", &mut out);
        assert_eq!(out, b"a\\(b\\)\\\\c \xe9 ?".to_vec());
    }

    #[test]
    fn test_typographic_punctuation_uses_win_ansi() {
        let mut out = Vec::new();
        encode_pdf_string("it’s “fine” – — • item… €5 ‘q’", &mut out);

        assert!(!out.contains(&b'?'));
        assert_eq!(
            out,
            b"it\x92s \x93fine\x94 \x96 \x97 \x95 item\x85 \x805 \x91q\x92".to_vec()
        );
    }

    #[test]
    fn test_wrap() {
        let width = |s: &str| text_width(&s.chars().collect::<Vec<_>>());

        assert_eq!(wrap("aa bb cc", width("aa bb")), vec!["aa bb", "cc"]);
        assert_eq!(wrap("abcdefgh", width("abc")), vec!["abc", "def", "gh"]);
        assert_eq!(wrap("line\nbreaks  collapse", 100_000), vec!["line breaks collapse"]);
        assert!(wrap("   ", 10_000).is_empty());
    }

    #[test]
    fn test_wide_glyphs_stay_inside_margin() {
        let text = "W".repeat(200);
        let lines = wrap(&text, LINE_WIDTH);

        assert!(lines.len() > 3);
        for line in &lines {
            assert!(text_width(&line.chars().collect::<Vec<_>>()) <= LINE_WIDTH);
        }
        assert_eq!(lines.concat(), text);

        // Narrow glyphs pack far more per line than wide ones
        let narrow = wrap(&"i".repeat(200), LINE_WIDTH);
        assert_eq!(narrow.len(), 1);
    }

    #[test]
    fn test_glyph_widths() {
        assert_eq!(glyph_width(' '), 278);
        assert_eq!(glyph_width('W'), 944);
        assert_eq!(glyph_width('i'), 222);
        assert_eq!(glyph_width('~'), 584);
        assert_eq!(glyph_width('—'), 1000);
        assert_eq!(glyph_width('漢'), glyph_width('?'));
    }
}
