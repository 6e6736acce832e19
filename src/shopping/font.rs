use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use crate::shopping::document::DocumentError;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use ttf_parser::Face;

/// bfchar entries per block; CMap blocks are capped at 100 entries.
const CMAP_CHUNK: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Glyph {
    id: u16,
    advance: u16,
}

/// Glyph ids used by one document, mapped back to the text they came from.
pub type GlyphUsage = BTreeMap<u16, char>;

/// A TrueType font embedded whole as a CID-keyed font, addressed by glyph id.
#[derive(Debug, Clone)]
pub struct TrueTypeFont {
    name: String,
    data: Vec<u8>,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    cap_height: i16,
    italic_angle: f32,
    bbox: [i16; 4],
    glyphs: HashMap<char, Glyph>,
    missing_advance: u16,
}

fn font_name(path: &Path) -> String {
    let name: String = path
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();

    if name.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        name
    }
}

impl TrueTypeFont {
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let data = std::fs::read(path).map_err(|e| DocumentError::Asset {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_bytes(font_name(path), data).map_err(|e| DocumentError::Font {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_bytes(name: String, data: Vec<u8>) -> Result<Self, ttf_parser::FaceParsingError> {
        let face = Face::parse(&data, 0)?;

        let mut codepoints = Vec::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if subtable.is_unicode() {
                    subtable.codepoints(|cp| codepoints.push(cp));
                }
            }
        }

        let mut glyphs = HashMap::with_capacity(codepoints.len());
        for ch in codepoints.into_iter().filter_map(char::from_u32) {
            if let Some(id) = face.glyph_index(ch) {
                let advance = face.glyph_hor_advance(id).unwrap_or(0);
                glyphs.insert(ch, Glyph { id: id.0, advance });
            }
        }

        let bbox = face.global_bounding_box();
        let bbox = [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max];
        let missing_advance = face.glyph_hor_advance(ttf_parser::GlyphId(0)).unwrap_or(0);
        let units_per_em = face.units_per_em();
        let ascender = face.ascender();
        let descender = face.descender();
        let cap_height = face.capital_height().unwrap_or(ascender);
        let italic_angle = face.italic_angle();

        let font = Self {
            name,
            data,
            units_per_em,
            ascender,
            descender,
            cap_height,
            italic_angle,
            bbox,
            glyphs,
            missing_advance,
        };

        log::debug!("loaded font {} ({} glyphs mapped)", font.name, font.glyphs.len());
        Ok(font)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn glyph(&self, ch: char) -> Glyph {
        self.glyphs.get(&ch).copied().unwrap_or(Glyph {
            id: 0,
            advance: self.missing_advance,
        })
    }

    /// Scales font units to PDF glyph space (1000 units per em).
    fn scale(&self, value: i64) -> i64 {
        value * 1000 / i64::from(self.units_per_em.max(1))
    }

    /// Width of `text` in points at `size`.
    pub fn string_width(&self, text: &str, size: f32) -> f32 {
        let units: u32 = text.chars().map(|ch| u32::from(self.glyph(ch).advance)).sum();
        units as f32 * size / f32::from(self.units_per_em.max(1))
    }

    /// Encodes `text` as big-endian glyph ids for an Identity-H font and
    /// records the glyphs it touched.
    pub fn encode(&self, text: &str, usage: &mut GlyphUsage) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(text.len() * 2);
        for ch in text.chars() {
            let glyph = self.glyph(ch);
            usage.entry(glyph.id).or_insert(ch);
            bytes.extend_from_slice(&glyph.id.to_be_bytes());
        }
        bytes
    }

    fn widths(&self, usage: &GlyphUsage) -> Vec<Object> {
        let mut advances: BTreeMap<u16, u16> = BTreeMap::new();
        for glyph in self.glyphs.values() {
            if usage.contains_key(&glyph.id) {
                advances.insert(glyph.id, glyph.advance);
            }
        }
        if usage.contains_key(&0) {
            advances.insert(0, self.missing_advance);
        }

        let mut widths = Vec::with_capacity(advances.len() * 2);
        for (id, advance) in advances {
            widths.push(Object::Integer(i64::from(id)));
            widths.push(Object::Array(vec![Object::Integer(
                self.scale(i64::from(advance)),
            )]));
        }
        widths
    }

    fn to_unicode(usage: &GlyphUsage) -> Vec<u8> {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
        );

        let entries: Vec<(&u16, &char)> = usage.iter().collect();
        for chunk in entries.chunks(CMAP_CHUNK) {
            cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
            for (id, ch) in chunk {
                let mut units = [0u16; 2];
                let utf16: String = ch
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|unit| format!("{unit:04X}"))
                    .collect();
                cmap.push_str(&format!("<{id:04X}> <{utf16}>\n"));
            }
            cmap.push_str("endbfchar\n");
        }

        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /CMap defineresource pop\n\
             end\n\
             end\n",
        );
        cmap.into_bytes()
    }

    /// Writes the font program and its dictionaries into `doc` and returns the
    /// id of the Type0 font to reference from page resources.
    pub fn embed(&self, doc: &mut Document, usage: &GlyphUsage) -> ObjectId {
        let font_file = Stream::new(
            dictionary! { "Length1" => self.data.len() as i64 },
            self.data.clone(),
        );
        let font_file_id = doc.add_object(font_file);

        let bbox: Vec<Object> = self
            .bbox
            .iter()
            .map(|v| Object::Integer(self.scale(i64::from(*v))))
            .collect();
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => self.name.as_str(),
            "Flags" => 32i64,
            "FontBBox" => bbox,
            "ItalicAngle" => Object::Real(self.italic_angle),
            "Ascent" => self.scale(i64::from(self.ascender)),
            "Descent" => self.scale(i64::from(self.descender)),
            "CapHeight" => self.scale(i64::from(self.cap_height)),
            "StemV" => 80i64,
            "FontFile2" => font_file_id,
        });

        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => self.name.as_str(),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0i64,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => self.scale(i64::from(self.missing_advance)),
            "W" => self.widths(usage),
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id = doc.add_object(Stream::new(Dictionary::new(), Self::to_unicode(usage)));

        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => self.name.as_str(),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE_FONT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/DejaVuSerif.ttf");

    fn fixture_font() -> TrueTypeFont {
        TrueTypeFont::load(Path::new(FIXTURE_FONT)).unwrap()
    }

    #[test]
    fn font_names_are_sanitized() {
        assert_eq!(font_name(Path::new("/fonts/Georgia Bold.ttf")), "GeorgiaBold");
        assert_eq!(font_name(Path::new("/fonts/.ttf")), "ttf");
        assert_eq!(font_name(Path::new("/")), "EmbeddedFont");
    }

    #[test]
    fn garbage_is_not_a_font() {
        assert!(TrueTypeFont::from_bytes("Broken".to_string(), b"not a font".to_vec()).is_err());
    }

    #[test]
    fn missing_file_is_an_asset_error() {
        let err = TrueTypeFont::load(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(matches!(err, DocumentError::Asset { .. }));
    }

    #[test]
    fn widths_scale_with_size() {
        let font = fixture_font();

        let small = font.string_width("Flour   300  (g)", 8.0);
        let large = font.string_width("Flour   300  (g)", 16.0);
        assert!(small > 0.0);
        assert!((large - 2.0 * small).abs() < 0.001);
        assert_eq!(font.string_width("", 16.0), 0.0);
    }

    #[test]
    fn encoding_records_used_glyphs() {
        let font = fixture_font();

        let mut usage = GlyphUsage::new();
        let bytes = font.encode("Egg", &mut usage);

        assert_eq!(bytes.len(), 6);
        assert_eq!(usage.len(), 2);
        assert!(usage.values().any(|ch| *ch == 'E'));
        assert!(usage.values().any(|ch| *ch == 'g'));
    }

    #[test]
    fn fixture_name_comes_from_the_file() {
        assert_eq!(fixture_font().name(), "DejaVuSerif");
    }

    #[test]
    fn embedding_writes_a_type0_font() {
        let font = fixture_font();
        let mut usage = GlyphUsage::new();
        font.encode("Salt", &mut usage);

        let mut doc = Document::with_version("1.5");
        let id = font.embed(&mut doc, &usage);
        let dict = doc.get_dictionary(id).unwrap();

        assert_eq!(dict.get(b"Subtype").unwrap().as_name().unwrap(), b"Type0");
        assert_eq!(dict.get(b"Encoding").unwrap().as_name().unwrap(), b"Identity-H");
        assert_eq!(dict.get(b"BaseFont").unwrap().as_name().unwrap(), b"DejaVuSerif");
        // font program, descriptor, CID font, ToUnicode and the Type0 font
        assert_eq!(doc.objects.len(), 5);
    }

    #[test]
    fn to_unicode_maps_glyphs_in_blocks() {
        let usage: GlyphUsage = (1..=150u16).map(|id| (id, 'a')).collect();
        let cmap = String::from_utf8(TrueTypeFont::to_unicode(&usage)).unwrap();

        assert!(cmap.contains("100 beginbfchar"));
        assert!(cmap.contains("50 beginbfchar"));
        assert!(cmap.contains("<0001> <0061>"));
    }
}
