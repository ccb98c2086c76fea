//! Zipped result package.
//!
//! The package is an ESRI shapefile of the intersection records:
//! `resultado.shp`, `.shx` and `.dbf`, a `.cpg` naming the table encoding,
//! and a `.prj` when the result CRS is WKT. Entries are deflate-compressed.
//!
//! DBF field names are limited to ten bytes, so long attribute names are
//! truncated and de-duplicated with a numeric suffix.

use std::collections::HashSet;
use std::io::{Cursor, Write as _};
use std::path::Path;

use dbase::{FieldName, FieldValue, TableWriterBuilder};
use deforest_overlap_models::{AttributeValue, IntersectionRecord, OverlapReport};
use shapefile::ShapeWriter;

use crate::ExportError;

/// Base name of every entry in the package.
pub const ENTRY_STEM: &str = "resultado";

/// Text encoding of the packaged `.dbf`, as written to the `.cpg`.
const TABLE_ENCODING: &str = "UTF-8";

const MAX_FIELD_NAME_BYTES: usize = 10;
const MAX_CHARACTER_BYTES: u8 = 254;

const INTEGER_LENGTH: u8 = 18;
const DECIMAL_LENGTH: u8 = 19;
const DECIMAL_PLACES: u8 = 6;

/// Writes the package to `archive_path` and returns its size in bytes.
///
/// The archive is written to a temporary file first and renamed into
/// place, so an interrupted run never leaves a truncated package. The
/// temporary file is removed when writing fails.
///
/// # Errors
///
/// Returns an error if the shapefile cannot be encoded or the archive
/// cannot be written.
pub fn write_package(report: &OverlapReport, archive_path: &Path) -> Result<u64, ExportError> {
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let entries = package_entries(report)?;

    let tmp_path = archive_path.with_extension("zip.tmp");
    let written = write_archive(&tmp_path, &entries).and_then(|()| {
        std::fs::rename(&tmp_path, archive_path).map_err(|e| io_error(archive_path, e))
    });
    if let Err(e) = written {
        if let Err(cleanup) = std::fs::remove_file(&tmp_path) {
            log::debug!("Could not remove {}: {cleanup}", tmp_path.display());
        }
        return Err(e);
    }

    let size = std::fs::metadata(archive_path)
        .map(|m| m.len())
        .unwrap_or(0);

    log::info!(
        "Wrote {} ({} entries, {size} bytes)",
        archive_path.display(),
        entries.len()
    );

    Ok(size)
}

fn write_archive(path: &Path, entries: &[(String, Vec<u8>)]) -> Result<(), ExportError> {
    let file = std::fs::File::create(path).map_err(|e| io_error(path, e))?;

    let mut zip_writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, data) in entries {
        zip_writer.start_file(name.as_str(), options)?;
        zip_writer.write_all(data).map_err(|e| io_error(path, e))?;
    }
    zip_writer.finish()?;

    Ok(())
}

/// Builds the named archive entries in package order.
fn package_entries(report: &OverlapReport) -> Result<Vec<(String, Vec<u8>)>, ExportError> {
    let shapefile = encode_shapefile(report)?;

    let mut entries = vec![
        (format!("{ENTRY_STEM}.shp"), shapefile.shp),
        (format!("{ENTRY_STEM}.shx"), shapefile.shx),
        (format!("{ENTRY_STEM}.dbf"), shapefile.dbf),
        (
            format!("{ENTRY_STEM}.cpg"),
            TABLE_ENCODING.as_bytes().to_vec(),
        ),
    ];

    match report.crs.as_deref() {
        Some(crs) if is_wkt(crs) => {
            entries.push((format!("{ENTRY_STEM}.prj"), crs.trim().as_bytes().to_vec()));
        }
        Some(crs) => log::warn!("CRS '{crs}' is not WKT; the package has no .prj"),
        None => {}
    }

    Ok(entries)
}

/// Whether `crs` looks like a WKT definition (`PROJCS[...]`,
/// `GEOGCRS[...]`, ...) rather than an authority code or URN.
fn is_wkt(crs: &str) -> bool {
    let crs = crs.trim();
    crs.ends_with(']')
        && crs.split_once('[').is_some_and(|(keyword, _)| {
            !keyword.is_empty()
                && keyword
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

struct EncodedShapefile {
    shp: Vec<u8>,
    shx: Vec<u8>,
    dbf: Vec<u8>,
}

fn encode_shapefile(report: &OverlapReport) -> Result<EncodedShapefile, ExportError> {
    let fields = table_fields(report);

    let mut builder = TableWriterBuilder::with_encoding(dbase::UnicodeLossy);
    for field in &fields {
        let name = FieldName::try_from(field.name.as_str()).map_err(|reason| {
            ExportError::FieldName {
                name: field.name.clone(),
                reason,
            }
        })?;
        builder = match field.kind {
            FieldKind::Character(length) => builder.add_character_field(name, length),
            FieldKind::Numeric { length, decimals } => {
                builder.add_numeric_field(name, length, decimals)
            }
            FieldKind::Logical => builder.add_logical_field(name),
        };
    }

    let mut shp = Cursor::new(Vec::new());
    let mut shx = Cursor::new(Vec::new());
    let mut dbf = Cursor::new(Vec::new());

    {
        let mut shapes = ShapeWriter::with_shx(&mut shp, &mut shx);
        let mut table = builder.build_with_dest(&mut dbf);

        for record in &report.records {
            let polygon = shapefile::Polygon::from(record.geometry.to_multi_polygon());
            shapes.write_shape(&polygon)?;
            table.write_record(&table_row(record, &fields))?;
        }

        table.close()?;
    }

    Ok(EncodedShapefile {
        shp: shp.into_inner(),
        shx: shx.into_inner(),
        dbf: dbf.into_inner(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Character(u8),
    Numeric { length: u8, decimals: u8 },
    Logical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Derived {
    Periodo,
    AreaKm,
    Percentual,
    AreaPeriodo,
    AreaTotalFazenda,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldSource {
    Attribute(String),
    Derived(Derived),
}

/// One `.dbf` column: its stored name, type and where its values come from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TableField {
    name: String,
    kind: FieldKind,
    source: FieldSource,
}

const DECIMAL: FieldKind = FieldKind::Numeric {
    length: DECIMAL_LENGTH,
    decimals: DECIMAL_PLACES,
};

/// Attribute columns in record order, then the derived columns.
fn table_fields(report: &OverlapReport) -> Vec<TableField> {
    let derived = [
        ("periodo", Derived::Periodo),
        ("area_km", Derived::AreaKm),
        ("percentual", Derived::Percentual),
        ("area_periodo", Derived::AreaPeriodo),
        ("area_total_fazenda", Derived::AreaTotalFazenda),
    ];

    let mut taken = HashSet::new();
    let derived_names: Vec<String> = derived
        .iter()
        .map(|(name, _)| field_name(name, &mut taken))
        .collect();

    let mut fields: Vec<TableField> = report
        .attribute_columns()
        .into_iter()
        .map(|column| TableField {
            name: field_name(&column, &mut taken),
            kind: attribute_kind(report, &column),
            source: FieldSource::Attribute(column),
        })
        .collect();

    let periodo_length = report
        .records
        .iter()
        .map(|record| record.periodo.len())
        .max()
        .unwrap_or(0);

    fields.extend(
        derived
            .into_iter()
            .zip(derived_names)
            .map(|((_, derived), name)| TableField {
                name,
                kind: match derived {
                    Derived::Periodo => FieldKind::Character(character_length(periodo_length)),
                    _ => DECIMAL,
                },
                source: FieldSource::Derived(derived),
            }),
    );

    fields
}

/// Picks the narrowest field type that holds every value of `column`.
fn attribute_kind(report: &OverlapReport, column: &str) -> FieldKind {
    let values: Vec<&AttributeValue> = report
        .records
        .iter()
        .filter_map(|record| record.attributes.get(column))
        .filter(|value| !matches!(value, AttributeValue::Null))
        .collect();

    if values.is_empty() {
        return FieldKind::Character(1);
    }
    if values
        .iter()
        .all(|value| matches!(value, AttributeValue::Bool(_)))
    {
        return FieldKind::Logical;
    }
    if values
        .iter()
        .all(|value| matches!(value, AttributeValue::Integer(_)))
    {
        return FieldKind::Numeric {
            length: INTEGER_LENGTH,
            decimals: 0,
        };
    }
    if values.iter().all(|value| {
        matches!(value, AttributeValue::Integer(_))
            || matches!(value, AttributeValue::Float(f) if f.is_finite())
    }) {
        return DECIMAL;
    }

    let longest = values
        .iter()
        .map(|value| value.to_string().len())
        .max()
        .unwrap_or(0);
    FieldKind::Character(character_length(longest))
}

fn character_length(bytes: usize) -> u8 {
    u8::try_from(bytes).map_or(MAX_CHARACTER_BYTES, |length| {
        length.clamp(1, MAX_CHARACTER_BYTES)
    })
}

/// Truncates `name` to the `.dbf` limit and makes it unique within `taken`.
fn field_name(name: &str, taken: &mut HashSet<String>) -> String {
    let name = if name.trim().is_empty() { "campo" } else { name.trim() };

    let base = truncate_bytes(name, MAX_FIELD_NAME_BYTES).to_string();
    if taken.insert(base.to_ascii_lowercase()) {
        return base;
    }

    let mut n = 1usize;
    loop {
        let suffix = format!("_{n}");
        let stem = truncate_bytes(name, MAX_FIELD_NAME_BYTES.saturating_sub(suffix.len()));
        let candidate = format!("{stem}{suffix}");
        if taken.insert(candidate.to_ascii_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Longest prefix of `text` that fits in `max` bytes without splitting a
/// character.
fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let end = (0..=max)
        .rev()
        .find(|&index| text.is_char_boundary(index))
        .unwrap_or(0);
    &text[..end]
}

fn table_row(record: &IntersectionRecord, fields: &[TableField]) -> dbase::Record {
    let mut row = dbase::Record::default();
    for field in fields {
        let value = match &field.source {
            FieldSource::Attribute(column) => {
                attribute_field(record.attributes.get(column), field.kind)
            }
            FieldSource::Derived(Derived::Periodo) => FieldValue::Character(Some(
                truncate_bytes(&record.periodo, usize::from(MAX_CHARACTER_BYTES)).to_string(),
            )),
            FieldSource::Derived(Derived::AreaKm) => FieldValue::Numeric(Some(record.area_km)),
            FieldSource::Derived(Derived::Percentual) => {
                FieldValue::Numeric(Some(record.percentual))
            }
            FieldSource::Derived(Derived::AreaPeriodo) => {
                FieldValue::Numeric(Some(record.area_periodo))
            }
            FieldSource::Derived(Derived::AreaTotalFazenda) => {
                FieldValue::Numeric(Some(record.area_total_fazenda))
            }
        };
        row.insert(field.name.clone(), value);
    }
    row
}

#[allow(clippy::cast_precision_loss)]
fn attribute_field(value: Option<&AttributeValue>, kind: FieldKind) -> FieldValue {
    let value = value.filter(|value| !matches!(value, AttributeValue::Null));
    match kind {
        FieldKind::Logical => FieldValue::Logical(value.and_then(|value| match value {
            AttributeValue::Bool(flag) => Some(*flag),
            _ => None,
        })),
        FieldKind::Numeric { .. } => FieldValue::Numeric(value.and_then(|value| match value {
            AttributeValue::Integer(number) => Some(*number as f64),
            AttributeValue::Float(number) => Some(*number),
            _ => None,
        })),
        FieldKind::Character(length) => FieldValue::Character(value.map(|value| {
            truncate_bytes(&value.to_string(), usize::from(length)).to_string()
        })),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::sample_report;
    use geo::Area as _;
    use std::io::Read as _;
    use std::path::PathBuf;

    const SIRGAS_UTM_22S: &str = r#"PROJCS["SIRGAS 2000 / UTM zone 22S",GEOGCS["SIRGAS 2000",DATUM["Sistema_de_Referencia_Geocentrico_para_las_AmericaS_2000",SPHEROID["GRS 1980",6378137,298.257222101]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",-51],PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],PARAMETER["false_northing",10000000],UNIT["metre",1]]"#;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn entry_names(archive_path: &Path) -> Vec<String> {
        let file = std::fs::File::open(archive_path).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        archive.file_names().map(ToString::to_string).collect()
    }

    /// Copies the archive entries into `dir` so the shapefile can be opened
    /// from disk.
    fn extract(archive_path: &Path, dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        let file = std::fs::File::open(archive_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            std::fs::write(dir.join(entry.name()), data).unwrap();
        }
    }

    #[test]
    fn package_is_a_readable_shapefile() {
        let tmp = scratch_dir("deforest_export_package_shapefile");
        let mut report = sample_report();
        report.crs = Some(SIRGAS_UTM_22S.into());

        let archive_path = tmp.join("out").join("resultado.zip");
        let size = write_package(&report, &archive_path).unwrap();
        assert!(size > 0);
        assert!(!archive_path.with_extension("zip.tmp").exists());

        let mut names = entry_names(&archive_path);
        names.sort();
        assert_eq!(
            names,
            vec![
                "resultado.cpg",
                "resultado.dbf",
                "resultado.prj",
                "resultado.shp",
                "resultado.shx"
            ]
        );

        let extracted = tmp.join("extracted");
        extract(&archive_path, &extracted);

        assert_eq!(
            std::fs::read_to_string(extracted.join("resultado.prj")).unwrap(),
            SIRGAS_UTM_22S
        );
        assert_eq!(
            std::fs::read_to_string(extracted.join("resultado.cpg")).unwrap(),
            "UTF-8"
        );

        let mut reader = shapefile::Reader::from_path(extracted.join("resultado.shp")).unwrap();
        let rows = reader.read().unwrap();
        assert_eq!(rows.len(), 1);

        let (shape, record) = rows.into_iter().next().unwrap();
        let geometry = geo::Geometry::<f64>::try_from(shape).unwrap();
        assert!((geometry.unsigned_area() - 100_000.0).abs() < 1e-6);

        assert_eq!(
            record.get("fazenda"),
            Some(&FieldValue::Character(Some("Santa Rita".into())))
        );
        assert_eq!(record.get("year"), Some(&FieldValue::Numeric(Some(1985.0))));
        assert_eq!(
            record.get("periodo"),
            Some(&FieldValue::Character(Some("1980_1994".into())))
        );
        assert_eq!(record.get("area_km"), Some(&FieldValue::Numeric(Some(10.0))));
        assert_eq!(
            record.get("percentual"),
            Some(&FieldValue::Numeric(Some(20.0)))
        );
        assert_eq!(
            record.get("area_total"),
            Some(&FieldValue::Numeric(Some(50.0)))
        );

        let table = dbase::Reader::from_path(extracted.join("resultado.dbf")).unwrap();
        let columns: Vec<&str> = table.fields().iter().map(dbase::FieldInfo::name).collect();
        assert_eq!(
            columns,
            vec![
                "year",
                "fazenda",
                "periodo",
                "area_km",
                "percentual",
                "area_perio",
                "area_total"
            ]
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn authority_code_crs_gets_no_prj() {
        let tmp = scratch_dir("deforest_export_package_authority_crs");

        let report = sample_report();
        assert_eq!(report.crs.as_deref(), Some("EPSG:31982"));
        let archive_path = tmp.join("resultado.zip");
        write_package(&report, &archive_path).unwrap();

        let names = entry_names(&archive_path);
        assert_eq!(names.len(), 4);
        assert!(!names.iter().any(|name| name.ends_with(".prj")));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn package_without_crs_has_no_prj() {
        let tmp = scratch_dir("deforest_export_package_no_crs");

        let mut report = sample_report();
        report.crs = None;
        let archive_path = tmp.join("resultado.zip");
        write_package(&report, &archive_path).unwrap();

        assert_eq!(entry_names(&archive_path).len(), 4);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn empty_report_still_writes_a_shapefile() {
        let tmp = scratch_dir("deforest_export_package_empty");

        let mut report = sample_report();
        report.records.clear();
        let archive_path = tmp.join("resultado.zip");
        write_package(&report, &archive_path).unwrap();

        let extracted = tmp.join("extracted");
        extract(&archive_path, &extracted);
        let mut reader = shapefile::Reader::from_path(extracted.join("resultado.shp")).unwrap();
        assert!(reader.read().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn failed_rename_removes_temporary_archive() {
        let tmp = scratch_dir("deforest_export_package_rename_fails");

        // A non-empty directory where the archive should go.
        let archive_path = tmp.join("resultado.zip");
        std::fs::create_dir_all(&archive_path).unwrap();
        std::fs::write(archive_path.join("ocupado.txt"), "x").unwrap();

        let err = write_package(&sample_report(), &archive_path).unwrap_err();

        assert!(matches!(err, ExportError::Io { .. }));
        assert!(!archive_path.with_extension("zip.tmp").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_write_removes_temporary_archive() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }

        let tmp = scratch_dir("deforest_export_package_write_fails");
        std::fs::create_dir_all(&tmp).unwrap();
        let archive_path = tmp.join("resultado.zip");
        let tmp_path = archive_path.with_extension("zip.tmp");
        std::os::unix::fs::symlink(full, &tmp_path).unwrap();

        assert!(write_package(&sample_report(), &archive_path).is_err());

        assert!(std::fs::symlink_metadata(&tmp_path).is_err());
        assert!(!archive_path.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn recognizes_wkt() {
        assert!(is_wkt(SIRGAS_UTM_22S));
        assert!(is_wkt(" GEOGCRS[\"WGS 84\",DATUM[\"World Geodetic System 1984\"]]\n"));
        assert!(!is_wkt("EPSG:31982"));
        assert!(!is_wkt("urn:ogc:def:crs:EPSG::31982"));
        assert!(!is_wkt("[1, 2]"));
    }

    #[test]
    fn field_names_fit_dbf_limit_and_stay_unique() {
        let mut taken = HashSet::new();

        assert_eq!(field_name("area_total_fazenda", &mut taken), "area_total");
        assert_eq!(field_name("year_desmat_1", &mut taken), "year_desma");
        assert_eq!(field_name("year_desmat_2", &mut taken), "year_des_1");
        assert_eq!(field_name("YEAR_DESMAT", &mut taken), "YEAR_DES_2");
        assert_eq!(field_name("situação_atual", &mut taken), "situação");
        assert_eq!(field_name("  ", &mut taken), "campo");
    }

    #[test]
    fn field_kinds_follow_values() {
        let mut report = sample_report();
        let attributes = &mut report.records[0].attributes;
        attributes.insert("area_ha".into(), AttributeValue::Float(12.5));
        attributes.insert("ativo".into(), AttributeValue::Bool(true));
        attributes.insert("obs".into(), AttributeValue::Null);

        let kinds: Vec<(String, FieldKind)> = table_fields(&report)
            .into_iter()
            .map(|field| (field.name, field.kind))
            .collect();

        assert_eq!(
            kinds[..5],
            [
                (
                    "year".to_string(),
                    FieldKind::Numeric {
                        length: INTEGER_LENGTH,
                        decimals: 0
                    }
                ),
                ("fazenda".to_string(), FieldKind::Character(10)),
                ("area_ha".to_string(), DECIMAL),
                ("ativo".to_string(), FieldKind::Logical),
                ("obs".to_string(), FieldKind::Character(1)),
            ]
        );
        assert_eq!(kinds[5], ("periodo".to_string(), FieldKind::Character(9)));
    }
}
