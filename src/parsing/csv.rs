//! MNIST in CSV form: a header row, then `<label>,<pixel0>,<pixel1>,...`
//! per sample with pixel values 0-255.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use ndarray::Array2;
use tracing::info;

use super::decode::{normalize, one_hot, NUM_CLASSES};
use super::Dataset;
use crate::error::{DatasetError, FormatError, Result};

pub const NUM_FEATURES: usize = 784;

/// Parse a single field, reporting the line on failure.
fn parse_field<T: FromStr>(name: &str, field: &str, line: u64) -> Result<T> {
    T::from_str(field.trim()).map_err(|_| {
        DatasetError::format(
            name,
            FormatError::MalformedCsv {
                line,
                detail: format!("'{field}' is not a value between 0 and 255"),
            },
        )
    })
}

/// Parse a CSV dataset of 28x28 images from `path`.
pub fn parse_dataset(path: &Path) -> Result<Dataset> {
    let file = File::open(path)
        .map_err(|e| DatasetError::io(format!("opening {}", path.display()), e))?;

    parse_reader(&path.display().to_string(), file, NUM_FEATURES)
}

/// Parse CSV rows of `1 + features` fields into normalized images and
/// one-hot labels.
pub fn parse_reader<R: Read>(name: &str, reader: R, features: usize) -> Result<Dataset> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut data = Vec::new();
    let mut target = Vec::new();
    let mut count = 0;

    for record in reader.records() {
        let record = record.map_err(|e| {
            DatasetError::format(
                name,
                FormatError::MalformedCsv {
                    line: e.position().map_or(0, |p| p.line()),
                    detail: e.to_string(),
                },
            )
        })?;
        let line = record.position().map_or(0, |p| p.line());

        if record.len() != features + 1 {
            return Err(DatasetError::format(
                name,
                FormatError::MalformedCsv {
                    line,
                    detail: format!("expected {} fields, found {}", features + 1, record.len()),
                },
            ));
        }

        let label: u8 = parse_field(name, &record[0], line)?;
        let pixels = record
            .iter()
            .skip(1)
            .map(|field| parse_field::<u8>(name, field, line))
            .collect::<Result<Vec<_>>>()?;

        let one_hot_target = one_hot(usize::from(label), NUM_CLASSES).ok_or_else(|| {
            DatasetError::Range {
                file: name.to_string(),
                index: count,
                label,
                classes: NUM_CLASSES,
            }
        })?;

        data.extend(normalize(&pixels).iter().copied());
        target.extend(one_hot_target.iter().copied());
        count += 1;
    }

    info!(file = name, samples = count, "Parsed CSV dataset");
    Dataset::named(
        name,
        Array2::from_shape_vec((count, features), data)?,
        Array2::from_shape_vec((count, NUM_CLASSES), target)?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Dataset> {
        parse_reader("digits.csv", text.as_bytes(), 4)
    }

    #[test]
    fn parses_labels_and_normalizes_pixels() {
        let dataset = parse("label,p0,p1,p2,p3\n3,0,128,255,64\n9,255,255,255,255\n").unwrap();

        assert_eq!(dataset.len(), 2);
        let (image, label) = dataset.get(0).unwrap();
        assert_eq!(image[0], 0.0);
        assert_eq!(image[2], 1.0);
        assert!((image[1] - 0.502).abs() < 1e-3);
        assert_eq!(label[3], 1.0);
        assert_eq!(dataset.class_counts()[9], 1);
    }

    #[test]
    fn header_only_is_empty() {
        let dataset = parse("label,p0,p1,p2,p3\n").unwrap();

        assert!(dataset.is_empty());
        assert_eq!(dataset.data().dim(), (0, 4));
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        let err = parse("label,p0,p1,p2,p3\n1,0,0,0\n").unwrap_err();

        assert!(matches!(
            err,
            DatasetError::Format {
                reason: FormatError::MalformedCsv { line: 2, .. },
                ..
            }
        ));
    }

    #[test]
    fn pixel_above_255_is_malformed() {
        let err = parse("label,p0,p1,p2,p3\n1,0,0,0,256\n").unwrap_err();

        assert!(matches!(err, DatasetError::Format { .. }));
    }

    #[test]
    fn label_out_of_range() {
        let err = parse("label,p0,p1,p2,p3\n1,0,0,0,0\n12,0,0,0,0\n").unwrap_err();

        assert!(matches!(
            err,
            DatasetError::Range {
                index: 1,
                label: 12,
                ..
            }
        ));
    }
}
