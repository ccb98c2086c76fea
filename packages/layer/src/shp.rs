//! Shapefile layer decoding.
//!
//! Attribute columns keep the order of the `.dbf` header. Text fields are
//! decoded with the code page named by the `.cpg` companion when one is
//! submitted, otherwise with the language driver mark of the `.dbf` header.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use dbase::FieldValue;
use dbase::encoding::LossyCodePage;
use dbase::yore::code_pages;
use deforest_overlap_models::{AttributeValue, Attributes, Feature, Layer};
use shapefile::ShapeReader;

use crate::LayerError;
use crate::submission::ShapefileSet;

/// Reads a shapefile and its attribute table into a [`Layer`].
///
/// Shapes without geometry (null shapes) are skipped. The `.prj` content,
/// when present, becomes the layer's CRS description.
///
/// # Errors
///
/// Returns [`LayerError::Shapefile`] if the files cannot be decoded and
/// [`LayerError::Io`] if the `.prj` or `.cpg` cannot be read.
pub fn read_shapefile(set: &ShapefileSet) -> Result<Layer, LayerError> {
    let shapes = open_shapes(set).map_err(|e| decode_error(&set.shp, e))?;

    let mut table = dbase::Reader::from_path(&set.dbf).map_err(|e| decode_error(&set.dbf, e))?;
    if let Some(cpg) = &set.cpg {
        apply_cpg(&mut table, cpg)?;
    }
    let columns: Vec<String> = table
        .fields()
        .iter()
        .map(|field| field.name().trim().to_string())
        .collect();

    let mut reader = shapefile::Reader::new(shapes, table);

    let mut features = Vec::new();
    let mut skipped = 0usize;

    for item in reader.iter_shapes_and_records() {
        let (shape, record) = item.map_err(|e| decode_error(&set.shp, e))?;

        let geometry = match geo::Geometry::<f64>::try_from(shape) {
            Ok(geometry) => geometry,
            Err(e) => {
                log::debug!("Skipping shape without usable geometry: {e:?}");
                skipped += 1;
                continue;
            }
        };

        features.push(Feature::new(geometry, record_attributes(record, &columns)));
    }

    if skipped > 0 {
        log::warn!(
            "Skipped {skipped} shapes without geometry in {}",
            set.shp.display()
        );
    }

    let layer = Layer::new(features);

    let Some(prj) = &set.prj else {
        return Ok(layer);
    };
    let wkt = read_text(prj)?;
    let wkt = wkt.trim();

    Ok(if wkt.is_empty() {
        layer
    } else {
        layer.with_crs(wkt)
    })
}

fn open_shapes(set: &ShapefileSet) -> Result<ShapeReader<BufReader<File>>, shapefile::Error> {
    let shp = BufReader::new(File::open(&set.shp)?);
    let shx = BufReader::new(File::open(&set.shx)?);
    ShapeReader::with_shx(shp, shx)
}

fn decode_error(path: &Path, source: impl Into<shapefile::Error>) -> LayerError {
    LayerError::Shapefile {
        path: path.display().to_string(),
        source: source.into(),
    }
}

fn read_text(path: &Path) -> Result<String, LayerError> {
    std::fs::read_to_string(path).map_err(|e| LayerError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn apply_cpg<T: Read + Seek>(table: &mut dbase::Reader<T>, cpg: &Path) -> Result<(), LayerError> {
    let label = read_text(cpg)?;
    match CodePage::from_cpg(&label) {
        Some(code_page) => {
            log::debug!("Decoding {} as {code_page:?}", cpg.display());
            code_page.apply(table);
        }
        None => log::warn!(
            "Unsupported code page '{}' in {}; falling back to the .dbf header",
            label.trim(),
            cpg.display()
        ),
    }
    Ok(())
}

/// Code pages a `.cpg` companion can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodePage {
    Utf8,
    Windows1252,
    Dos850,
    Dos437,
}

impl CodePage {
    /// Parses the `.cpg` text. Case, spaces and separators are ignored, so
    /// `UTF-8`, `utf8` and `65001` all name the same code page.
    fn from_cpg(text: &str) -> Option<Self> {
        let label: String = text
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_ascii_uppercase();

        match label.as_str() {
            "UTF8" | "65001" => Some(Self::Utf8),
            "1252" | "CP1252" | "WINDOWS1252" | "ANSI1252" | "ISO88591" | "88591" | "LATIN1" => {
                Some(Self::Windows1252)
            }
            "850" | "CP850" | "IBM850" | "OEM850" => Some(Self::Dos850),
            "437" | "CP437" | "IBM437" | "OEM437" => Some(Self::Dos437),
            _ => None,
        }
    }

    fn apply<T: Read + Seek>(self, table: &mut dbase::Reader<T>) {
        match self {
            Self::Utf8 => table.set_encoding(dbase::UnicodeLossy),
            Self::Windows1252 => table.set_encoding(LossyCodePage(code_pages::CP1252)),
            Self::Dos850 => table.set_encoding(LossyCodePage(code_pages::CP850)),
            Self::Dos437 => table.set_encoding(LossyCodePage(code_pages::CP437)),
        }
    }
}

/// Converts a record into attributes ordered like the `.dbf` header.
fn record_attributes(record: dbase::Record, columns: &[String]) -> Attributes {
    let mut values: HashMap<String, FieldValue> = HashMap::from(record)
        .into_iter()
        .map(|(name, value)| (name.trim().to_string(), value))
        .collect();

    let mut attributes: Attributes = columns
        .iter()
        .filter_map(|name| values.remove_entry(name.as_str()))
        .map(|(name, value)| (name, field_value(value)))
        .collect();

    let mut rest: Vec<(String, FieldValue)> = values.into_iter().collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));
    attributes.extend(rest.into_iter().map(|(name, value)| (name, field_value(value))));

    attributes
}

/// Converts a DBF field value. `N` fields holding whole numbers (the usual
/// encoding of a year column) become integers.
fn field_value(value: FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(text) => text.map_or(AttributeValue::Null, AttributeValue::Text),
        FieldValue::Memo(text) => AttributeValue::Text(text),
        FieldValue::Numeric(number) => number.map_or(AttributeValue::Null, numeric),
        FieldValue::Float(number) => {
            number.map_or(AttributeValue::Null, |n| numeric(f64::from(n)))
        }
        FieldValue::Double(number) | FieldValue::Currency(number) => AttributeValue::Float(number),
        FieldValue::Integer(number) => AttributeValue::Integer(i64::from(number)),
        FieldValue::Logical(flag) => flag.map_or(AttributeValue::Null, AttributeValue::Bool),
        FieldValue::Date(date) => date
            .and_then(convert_date)
            .map_or(AttributeValue::Null, AttributeValue::Date),
        FieldValue::DateTime(datetime) => {
            convert_datetime(&datetime).map_or(AttributeValue::Null, AttributeValue::DateTime)
        }
        #[allow(unreachable_patterns)]
        other => AttributeValue::Text(format!("{other:?}")),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn numeric(number: f64) -> AttributeValue {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 9.0e15 {
        AttributeValue::Integer(number as i64)
    } else {
        AttributeValue::Float(number)
    }
}

fn convert_date(date: dbase::Date) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(i32::try_from(date.year()).ok()?, date.month(), date.day())
}

fn convert_datetime(datetime: &dbase::DateTime) -> Option<NaiveDateTime> {
    let time = datetime.time();
    convert_date(datetime.date())?.and_hms_opt(time.hours(), time.minutes(), time.seconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{SeekFrom, Write as _};
    use std::path::PathBuf;

    use dbase::FieldName;
    use geo::polygon;
    use shapefile::ShapeWriter;

    /// Position of the language driver (code page) byte in a `.dbf` header.
    const CODE_PAGE_OFFSET: u64 = 29;
    const UTF8_MARK: u8 = 0xF0;
    const CP1252_MARK: u8 = 0x03;

    fn fixture_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Writes a one-polygon shapefile whose table holds `nome` encoded with
    /// `encoding`, then stamps `code_page_mark` into the `.dbf` header.
    fn write_fixture<E: dbase::Encoding + 'static>(
        dir: &Path,
        encoding: E,
        nome: &str,
        code_page_mark: u8,
    ) -> ShapefileSet {
        let set = ShapefileSet {
            shp: dir.join("desmatamento.shp"),
            shx: dir.join("desmatamento.shx"),
            dbf: dir.join("desmatamento.dbf"),
            prj: None,
            cpg: None,
        };

        {
            let mut shapes = ShapeWriter::from_path(&set.shp).unwrap();
            let square = polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0)
            ];
            shapes
                .write_shape(&shapefile::Polygon::from(square))
                .unwrap();
        }

        let mut table = dbase::TableWriterBuilder::with_encoding(encoding)
            .add_numeric_field(FieldName::try_from("year_desm").unwrap(), 4, 0)
            .add_numeric_field(FieldName::try_from("year_atual").unwrap(), 4, 0)
            .add_character_field(FieldName::try_from("nome").unwrap(), 40)
            .build_with_file_dest(&set.dbf)
            .unwrap();
        let mut record = dbase::Record::default();
        record.insert("year_desm".into(), FieldValue::Numeric(Some(1990.0)));
        record.insert("year_atual".into(), FieldValue::Numeric(Some(2023.0)));
        record.insert("nome".into(), FieldValue::Character(Some(nome.into())));
        table.write_record(&record).unwrap();
        table.close().unwrap();
        drop(table);

        let mut dbf = std::fs::OpenOptions::new()
            .write(true)
            .open(&set.dbf)
            .unwrap();
        dbf.seek(SeekFrom::Start(CODE_PAGE_OFFSET)).unwrap();
        dbf.write_all(&[code_page_mark]).unwrap();

        set
    }

    fn with_cpg(mut set: ShapefileSet, label: &str) -> ShapefileSet {
        let cpg = set.shp.with_extension("cpg");
        std::fs::write(&cpg, label).unwrap();
        set.cpg = Some(cpg);
        set
    }

    fn nome_of(layer: &Layer) -> Option<AttributeValue> {
        layer.features[0].attributes.get("nome").cloned()
    }

    #[test]
    fn whole_numbers_become_integers() {
        assert_eq!(numeric(1994.0), AttributeValue::Integer(1994));
        assert_eq!(numeric(12.75), AttributeValue::Float(12.75));
    }

    #[test]
    fn converts_dbf_values() {
        assert_eq!(
            field_value(FieldValue::Numeric(Some(2003.0))),
            AttributeValue::Integer(2003)
        );
        assert_eq!(field_value(FieldValue::Numeric(None)), AttributeValue::Null);
        assert_eq!(
            field_value(FieldValue::Character(Some("PRODES".into()))),
            AttributeValue::Text("PRODES".into())
        );
        assert_eq!(
            field_value(FieldValue::Logical(Some(false))),
            AttributeValue::Bool(false)
        );
        assert_eq!(field_value(FieldValue::Integer(7)), AttributeValue::Integer(7));
    }

    #[test]
    fn missing_shapefile_is_an_error() {
        let dir = std::env::temp_dir().join("deforest_layer_missing_shp");
        let set = ShapefileSet {
            shp: dir.join("nada.shp"),
            shx: dir.join("nada.shx"),
            dbf: dir.join("nada.dbf"),
            prj: None,
            cpg: None,
        };

        let err = read_shapefile(&set).unwrap_err();
        assert!(matches!(err, LayerError::Shapefile { .. }));
        assert!(err.to_string().contains("nada.shp"));
    }

    #[test]
    fn dbf_columns_keep_header_order() {
        let dir = fixture_dir("deforest_layer_shp_column_order");
        let set = write_fixture(&dir, dbase::UnicodeLossy, "Santa Rita", UTF8_MARK);

        let layer = read_shapefile(&set).unwrap();

        assert_eq!(layer.len(), 1);
        assert!(matches!(
            layer.features[0].geometry,
            geo::Geometry::MultiPolygon(_)
        ));
        assert_eq!(
            layer.columns(),
            vec![
                "year_desm".to_string(),
                "year_atual".to_string(),
                "nome".to_string()
            ]
        );
        assert_eq!(
            layer.features[0].attributes.get("year_desm"),
            Some(&AttributeValue::Integer(1990))
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cpg_decodes_latin1_table() {
        let dir = fixture_dir("deforest_layer_shp_cpg_latin1");
        let set = write_fixture(
            &dir,
            LossyCodePage(code_pages::CP1252),
            "São João",
            UTF8_MARK,
        );
        let expected = Some(AttributeValue::Text("São João".into()));

        let without_cpg = read_shapefile(&set).ok().and_then(|layer| nome_of(&layer));
        assert_ne!(without_cpg, expected);

        let layer = read_shapefile(&with_cpg(set, "1252")).unwrap();
        assert_eq!(nome_of(&layer), expected);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cpg_overrides_header_code_page() {
        let dir = fixture_dir("deforest_layer_shp_cpg_utf8");
        let set = write_fixture(&dir, dbase::UnicodeLossy, "São João", CP1252_MARK);
        let expected = Some(AttributeValue::Text("São João".into()));

        let layer = read_shapefile(&set).unwrap();
        assert_ne!(nome_of(&layer), expected);

        let layer = read_shapefile(&with_cpg(set, "UTF-8\n")).unwrap();
        assert_eq!(nome_of(&layer), expected);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_cpg_keeps_header_code_page() {
        let dir = fixture_dir("deforest_layer_shp_cpg_unknown");
        let set = write_fixture(&dir, dbase::UnicodeLossy, "Açaí", UTF8_MARK);

        let layer = read_shapefile(&with_cpg(set, "KOI8-R")).unwrap();
        assert_eq!(nome_of(&layer), Some(AttributeValue::Text("Açaí".into())));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn parses_cpg_labels() {
        assert_eq!(CodePage::from_cpg("UTF-8"), Some(CodePage::Utf8));
        assert_eq!(CodePage::from_cpg(" utf8\r\n"), Some(CodePage::Utf8));
        assert_eq!(CodePage::from_cpg("65001"), Some(CodePage::Utf8));
        assert_eq!(CodePage::from_cpg("1252"), Some(CodePage::Windows1252));
        assert_eq!(CodePage::from_cpg("ANSI 1252"), Some(CodePage::Windows1252));
        assert_eq!(CodePage::from_cpg("ISO-8859-1"), Some(CodePage::Windows1252));
        assert_eq!(CodePage::from_cpg("cp850"), Some(CodePage::Dos850));
        assert_eq!(CodePage::from_cpg("437"), Some(CodePage::Dos437));
        assert_eq!(CodePage::from_cpg("KOI8-R"), None);
        assert_eq!(CodePage::from_cpg(""), None);
    }
}
