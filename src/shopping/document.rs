use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use crate::{
    config::AssetConfig,
    constants::SHOPPING_LIST_TITLE,
    error::{Error, ErrorKind},
    shopping::{
        aggregation::ShoppingListRow,
        font::{GlyphUsage, TrueTypeFont},
    },
};

use image::{ExtendedColorType, ImageDecoder, ImageError, ImageFormat, ImageReader, RgbImage};
use lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document, Object, Stream, StringFormat,
};

// Letter, in points.
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

const INCH: f32 = 72.0;
const CM: f32 = INCH / 2.54;

const TITLE_SIZE: f32 = 18.0;
const BODY_SIZE: f32 = 16.0;
// Horizontal placement is measured at a larger size than the text is drawn.
const TITLE_MEASURE_SIZE: f32 = 22.0;
const BODY_MEASURE_SIZE: f32 = 18.0;

const TOP: f32 = PAGE_HEIGHT - 0.5 * INCH;
const TITLE_Y: f32 = TOP - 4.3 * CM;
const TITLE_RIGHT: f32 = 4.2 * CM;
const ROWS_Y: f32 = TOP - 4.8 * CM;
const ROW_RIGHT: f32 = 8.5 * CM;
const LINE_HEIGHT: f32 = 0.2 * INCH;
const BOTTOM_MARGIN: f32 = INCH;
const LEFT_MARGIN: f32 = 0.5 * INCH;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("cannot read asset {}: {source}", .path.display())]
    Asset {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse font {}: {source}", .path.display())]
    Font {
        path: PathBuf,
        source: ttf_parser::FaceParsingError,
    },
    #[error("cannot decode image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("cannot write pdf: {0}")]
    Pdf(#[from] lopdf::Error),
}

impl From<DocumentError> for Error {
    fn from(value: DocumentError) -> Self {
        log::error!("shopping list rendering failed: {value}");
        ErrorKind::InternalServerError.new("Failed to render the shopping list")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    Title,
    Body,
}

/// A run of text at a fixed position on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub style: TextStyle,
    pub size: f32,
    pub x: f32,
    pub y: f32,
    pub text: String,
}

/// Positions the title and one line per row, right-aligned against fixed
/// margins using the measured string widths. Rows that would cross the bottom
/// margin continue on a new page; only the first page carries the title.
///
/// `title_width` and `body_width` return the width in points of a string at a
/// given size.
pub fn layout<T, B>(rows: &[ShoppingListRow], title_width: T, body_width: B) -> Vec<Vec<PlacedText>>
where
    T: Fn(&str, f32) -> f32,
    B: Fn(&str, f32) -> f32,
{
    let spaced_title = SHOPPING_LIST_TITLE
        .chars()
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ");
    let title = PlacedText {
        style: TextStyle::Title,
        size: TITLE_SIZE,
        x: (PAGE_WIDTH - title_width(&spaced_title, TITLE_MEASURE_SIZE) - TITLE_RIGHT)
            .max(LEFT_MARGIN),
        y: TITLE_Y,
        text: SHOPPING_LIST_TITLE.to_string(),
    };

    let mut pages = vec![vec![title]];
    let mut y = ROWS_Y;
    for row in rows {
        if y < BOTTOM_MARGIN {
            pages.push(Vec::new());
            y = ROWS_Y;
        }

        let line = row.line();
        let x = PAGE_WIDTH - body_width(&format!(" {line} "), BODY_MEASURE_SIZE) - ROW_RIGHT;
        if let Some(page) = pages.last_mut() {
            page.push(PlacedText {
                style: TextStyle::Body,
                size: BODY_SIZE,
                x: x.max(LEFT_MARGIN),
                y,
                text: line,
            });
        }
        y -= LINE_HEIGHT;
    }

    pages
}

/// Background pixels ready to embed as an image XObject.
///
/// Gray and RGB JPEGs keep their encoded bytes and are drawn through
/// `DCTDecode`. Every other image is decoded to 8-bit RGB samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundImage {
    pub width: u32,
    pub height: u32,
    pub color_space: &'static str,
    pub filter: Option<&'static str>,
    pub data: Vec<u8>,
}

impl BackgroundImage {
    pub fn from_rgb(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            color_space: "DeviceRGB",
            filter: None,
            data: image.as_raw().clone(),
        }
    }

    pub fn decode(bytes: Vec<u8>) -> Result<Self, ImageError> {
        let jpeg = {
            let reader = ImageReader::new(Cursor::new(&bytes))
                .with_guessed_format()
                .map_err(ImageError::IoError)?;
            if reader.format() == Some(ImageFormat::Jpeg) {
                let decoder = reader.into_decoder()?;
                Some((decoder.dimensions(), decoder.original_color_type()))
            } else {
                None
            }
        };

        // CMYK and other JPEG layouts are re-encoded below
        let passthrough = match jpeg {
            Some((dimensions, ExtendedColorType::L8)) => Some((dimensions, "DeviceGray")),
            Some((dimensions, ExtendedColorType::Rgb8)) => Some((dimensions, "DeviceRGB")),
            _ => None,
        };
        if let Some(((width, height), color_space)) = passthrough {
            return Ok(Self {
                width,
                height,
                color_space,
                filter: Some("DCTDecode"),
                data: bytes,
            });
        }

        let image = image::load_from_memory(&bytes)?;
        Ok(Self::from_rgb(&image.to_rgb8()))
    }

    fn to_stream(&self) -> Stream {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(self.width),
            "Height" => i64::from(self.height),
            "ColorSpace" => self.color_space,
            "BitsPerComponent" => 8i64,
        };
        match self.filter {
            Some(filter) => {
                dict.set("Filter", filter);
                Stream::new(dict, self.data.clone()).with_compression(false)
            }
            None => Stream::new(dict, self.data.clone()),
        }
    }
}

/// Fonts and background the shopping list is drawn with.
#[derive(Debug, Clone)]
pub struct DocumentAssets {
    pub title_font: TrueTypeFont,
    pub body_font: TrueTypeFont,
    pub background: BackgroundImage,
}

fn load_image(path: &Path) -> Result<BackgroundImage, DocumentError> {
    let bytes = std::fs::read(path).map_err(|e| DocumentError::Asset {
        path: path.to_path_buf(),
        source: e,
    })?;

    BackgroundImage::decode(bytes).map_err(|e| DocumentError::Image {
        path: path.to_path_buf(),
        source: e,
    })
}

impl DocumentAssets {
    pub fn load(config: &AssetConfig) -> Result<Self, DocumentError> {
        Ok(Self {
            title_font: TrueTypeFont::load(&config.title_font)?,
            body_font: TrueTypeFont::load(&config.body_font)?,
            background: load_image(&config.background)?,
        })
    }
}

fn real(value: f32) -> Object {
    Object::Real(value)
}

/// Renders the aggregated list onto letter pages over the background image and
/// returns the PDF bytes.
pub fn render_shopping_list(
    rows: &[ShoppingListRow],
    assets: &DocumentAssets,
) -> Result<Vec<u8>, DocumentError> {
    let pages = layout(
        rows,
        |text, size| assets.title_font.string_width(text, size),
        |text, size| assets.body_font.string_width(text, size),
    );

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let background_id = doc.add_object(assets.background.to_stream());

    let mut title_usage = GlyphUsage::new();
    let mut body_usage = GlyphUsage::new();
    let mut contents = Vec::with_capacity(pages.len());
    for page in &pages {
        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(PAGE_WIDTH),
                    real(0.0),
                    real(0.0),
                    real(PAGE_HEIGHT),
                    real(0.0),
                    real(0.0),
                ],
            ),
            Operation::new("Do", vec!["Bg".into()]),
            Operation::new("Q", vec![]),
        ];

        for placed in page {
            let (font, resource, usage) = match placed.style {
                TextStyle::Title => (&assets.title_font, "F1", &mut title_usage),
                TextStyle::Body => (&assets.body_font, "F2", &mut body_usage),
            };
            let encoded = font.encode(&placed.text, usage);

            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec![resource.into(), real(placed.size)]));
            operations.push(Operation::new("Td", vec![real(placed.x), real(placed.y)]));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(encoded, StringFormat::Hexadecimal)],
            ));
            operations.push(Operation::new("ET", vec![]));
        }
        contents.push(Content { operations });
    }

    let title_font_id = assets.title_font.embed(&mut doc, &title_usage);
    let body_font_id = assets.body_font.embed(&mut doc, &body_usage);
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => title_font_id,
            "F2" => body_font_id,
        },
        "XObject" => dictionary! {
            "Bg" => background_id,
        },
    });

    let mut kids = Vec::with_capacity(contents.len());
    for content in contents {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![real(0.0), real(0.0), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| DocumentError::Pdf(e.into()))?;

    log::debug!(
        "rendered shopping list: {} rows on {} pages ({} bytes)",
        rows.len(),
        page_count,
        bytes.len()
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE_FONT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/DejaVuSerif.ttf");

    fn row(name: &str, unit: &str, total_amount: i64) -> ShoppingListRow {
        ShoppingListRow {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            total_amount,
        }
    }

    // Every character is 10pt wide at any size.
    fn fixed_width(text: &str, _size: f32) -> f32 {
        text.chars().count() as f32 * 10.0
    }

    fn test_assets() -> DocumentAssets {
        let font = TrueTypeFont::load(Path::new(FIXTURE_FONT)).unwrap();

        DocumentAssets {
            title_font: font.clone(),
            body_font: font,
            background: BackgroundImage::from_rgb(&RgbImage::from_pixel(
                8,
                10,
                image::Rgb([250, 240, 220]),
            )),
        }
    }

    fn background_file(suffix: &str) -> tempfile::NamedTempFile {
        tempfile::Builder::new()
            .prefix("foodgram-background")
            .suffix(suffix)
            .tempfile()
            .unwrap()
    }

    #[test]
    fn title_and_rows_are_placed_from_the_right() {
        let rows = vec![row("Egg", "pcs", 2), row("Flour", "g", 300)];
        let pages = layout(&rows, fixed_width, fixed_width);

        assert_eq!(pages.len(), 1);
        let page = &pages[0];
        assert_eq!(page.len(), 3);

        let title = &page[0];
        assert_eq!(title.style, TextStyle::Title);
        assert_eq!(title.text, "Shopping list:");
        // "S h o p p i n g   l i s t :" has 27 characters.
        assert!((title.x - (PAGE_WIDTH - 270.0 - 4.2 * CM)).abs() < 0.01);
        assert!((title.y - (PAGE_HEIGHT - 36.0 - 4.3 * CM)).abs() < 0.01);

        let egg = &page[1];
        assert_eq!(egg.text, "Egg   2  (pcs)");
        assert_eq!(egg.size, BODY_SIZE);
        assert!((egg.x - (PAGE_WIDTH - 160.0 - 8.5 * CM)).abs() < 0.01);
        assert!((egg.y - ROWS_Y).abs() < 0.01);
        assert!((page[2].y - (ROWS_Y - LINE_HEIGHT)).abs() < 0.01);
    }

    #[test]
    fn empty_list_still_has_a_title_page() {
        let pages = layout(&[], fixed_width, fixed_width);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].len(), 1);
    }

    #[test]
    fn long_lists_continue_on_new_pages() {
        let rows: Vec<_> = (0..100).map(|i| row(&format!("Item {i:03}"), "g", i)).collect();
        let pages = layout(&rows, fixed_width, fixed_width);

        assert!(pages.len() > 1);
        let placed_rows: usize = pages
            .iter()
            .flatten()
            .filter(|placed| placed.style == TextStyle::Body)
            .count();
        assert_eq!(placed_rows, 100);
        for placed in pages.iter().flatten() {
            assert!(placed.y >= BOTTOM_MARGIN - LINE_HEIGHT);
        }
        assert!(pages[1].iter().all(|placed| placed.style == TextStyle::Body));
        assert!((pages[1][0].y - ROWS_Y).abs() < 0.01);
    }

    #[test]
    fn very_long_lines_stay_on_the_page() {
        let rows = vec![row(&"x".repeat(200), "g", 1)];
        let pages = layout(&rows, fixed_width, fixed_width);
        assert_eq!(pages[0][1].x, LEFT_MARGIN);
    }

    #[test]
    fn missing_assets_fail_to_load() {
        let config = AssetConfig {
            title_font: PathBuf::from("/nonexistent/title.ttf"),
            body_font: PathBuf::from("/nonexistent/body.ttf"),
            background: PathBuf::from("/nonexistent/background.jpg"),
        };

        let err = DocumentAssets::load(&config).unwrap_err();
        assert!(matches!(err, DocumentError::Asset { ref path, .. } if path == Path::new("/nonexistent/title.ttf")));
        assert!(Error::from(err).is(ErrorKind::InternalServerError));
    }

    #[test]
    fn undecodable_background_is_an_image_error() {
        let file = background_file(".jpg");
        std::fs::write(file.path(), b"not an image").unwrap();

        let err = load_image(file.path()).unwrap_err();
        assert!(matches!(err, DocumentError::Image { .. }));
    }

    #[test]
    fn png_background_is_decoded_to_rgb() {
        let file = background_file(".png");
        RgbImage::from_pixel(3, 2, image::Rgb([1, 2, 3]))
            .save(file.path())
            .unwrap();

        let image = load_image(file.path()).unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(image.color_space, "DeviceRGB");
        assert_eq!(image.filter, None);
        assert_eq!(image.data, [1u8, 2, 3].repeat(6));
    }

    #[test]
    fn jpeg_background_is_passed_through() {
        let file = background_file(".jpg");
        RgbImage::from_pixel(40, 30, image::Rgb([200, 120, 40]))
            .save(file.path())
            .unwrap();
        let encoded = std::fs::read(file.path()).unwrap();

        let image = load_image(file.path()).unwrap();
        assert_eq!((image.width, image.height), (40, 30));
        assert_eq!(image.color_space, "DeviceRGB");
        assert_eq!(image.filter, Some("DCTDecode"));
        assert_eq!(image.data, encoded);
    }

    #[test]
    fn jpeg_background_keeps_its_filter_in_the_pdf() {
        let file = background_file(".jpg");
        RgbImage::from_pixel(40, 30, image::Rgb([200, 120, 40]))
            .save(file.path())
            .unwrap();
        let encoded = std::fs::read(file.path()).unwrap();
        let assets = DocumentAssets {
            background: load_image(file.path()).unwrap(),
            ..test_assets()
        };

        let bytes = render_shopping_list(&[row("Egg", "pcs", 2)], &assets).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let background = doc
            .objects
            .values()
            .filter_map(|object| object.as_stream().ok())
            .find(|stream| {
                stream.dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Image".as_slice())
            })
            .unwrap();

        assert_eq!(background.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
        assert_eq!(background.content, encoded);
    }

    #[test]
    fn renders_a_pdf() {
        let assets = test_assets();
        let rows = vec![row("Egg", "pcs", 2), row("Flour", "g", 300), row("Sugar", "g", 50)];

        let bytes = render_shopping_list(&rows, &assets).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn renders_one_page_per_layout_page() {
        let assets = test_assets();
        let rows: Vec<_> = (0..80).map(|i| row(&format!("Item {i}"), "g", i)).collect();
        let expected = layout(
            &rows,
            |t, s| assets.title_font.string_width(t, s),
            |t, s| assets.body_font.string_width(t, s),
        )
        .len();

        let bytes = render_shopping_list(&rows, &assets).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(expected > 1);
        assert_eq!(doc.get_pages().len(), expected);
    }
}
