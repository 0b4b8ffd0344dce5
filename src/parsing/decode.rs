//! Conversion of raw IDX records into normalized pixels and one-hot labels.

use std::io::Read;

use ndarray::{Array1, Array2};

use super::idx::{IdxHeader, IdxReader, Records};
use crate::error::{DatasetError, FormatError, Result};

pub const NUM_CLASSES: usize = 10;
const GREYSCALE_SIZE: f32 = 255f32;

// Headers are untrusted, so at most this many values are reserved up front.
const PREALLOC_VALUES: usize = 1 << 24;

/// Construct the one-hot encoding of `label`, or `None` if it is not a valid
/// class index.
pub fn one_hot(label: usize, classes: usize) -> Option<Array1<f32>> {
    if label >= classes {
        return None;
    }

    Some((0..classes).map(|idx| if idx == label { 1f32 } else { 0f32 }).collect())
}

/// Scale a raw pixel record into `[0, 1]`, keeping the row-major byte order.
pub fn normalize(record: &[u8]) -> Array1<f32> {
    record.iter().map(|&b| f32::from(b) / GREYSCALE_SIZE).collect()
}

/// Image samples decoded one record at a time.
pub struct ImageSamples<R> {
    records: Records<R>,
}

impl<R: Read> Iterator for ImageSamples<R> {
    type Item = Result<Array1<f32>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records
            .next()
            .map(|record| record.map(|bytes| normalize(&bytes)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

/// One-hot label vectors decoded one record at a time.
pub struct LabelVectors<R> {
    records: Records<R>,
}

impl<R: Read> Iterator for LabelVectors<R> {
    type Item = Result<Array1<f32>>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.records.position();
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };

        let label = match record[..] {
            [label] => label,
            _ => {
                return Some(Err(DatasetError::format(
                    self.records.name().to_string(),
                    FormatError::RecordLength {
                        expected: 1,
                        actual: record.len(),
                    },
                )))
            }
        };
        Some(
            one_hot(usize::from(label), NUM_CLASSES).ok_or_else(|| DatasetError::Range {
                file: self.records.name().to_string(),
                index,
                label,
                classes: NUM_CLASSES,
            }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

pub fn image_samples<R: Read>(reader: IdxReader<R>, header: &IdxHeader) -> ImageSamples<R> {
    ImageSamples {
        records: reader.records(header),
    }
}

pub fn label_vectors<R: Read>(reader: IdxReader<R>, header: &IdxHeader) -> LabelVectors<R> {
    LabelVectors {
        records: reader.records(header),
    }
}

/// Decode every image record into a `count x (rows * cols)` matrix.
pub fn decode_images<R: Read>(reader: IdxReader<R>, header: &IdxHeader) -> Result<Array2<f32>> {
    collect_rows(image_samples(reader, header), header.count, header.record_len())
}

/// Decode every label record into a `count x 10` one-hot matrix.
pub fn decode_labels<R: Read>(reader: IdxReader<R>, header: &IdxHeader) -> Result<Array2<f32>> {
    collect_rows(label_vectors(reader, header), header.count, NUM_CLASSES)
}

fn collect_rows<I>(rows: I, count: usize, width: usize) -> Result<Array2<f32>>
where
    I: Iterator<Item = Result<Array1<f32>>>,
{
    let mut values = Vec::with_capacity(count.saturating_mul(width).min(PREALLOC_VALUES));
    for row in rows {
        values.extend(row?.iter().copied());
    }

    Ok(Array2::from_shape_vec((count, width), values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;
    use crate::parsing::idx::IdxLayout;
    use std::io::Cursor;

    fn idx(fields: &[u32], payload: &[u8]) -> Cursor<Vec<u8>> {
        let mut bytes: Vec<u8> = fields.iter().flat_map(|f| f.to_be_bytes()).collect();
        bytes.extend_from_slice(payload);
        Cursor::new(bytes)
    }

    #[test]
    fn one_hot_marks_exactly_one_class() {
        for label in 0..NUM_CLASSES {
            let v = one_hot(label, NUM_CLASSES).unwrap();
            assert_eq!(v.len(), NUM_CLASSES);
            assert_eq!(v[label], 1.0);
            assert_eq!(v.sum(), 1.0);
        }
        assert!(one_hot(NUM_CLASSES, NUM_CLASSES).is_none());
    }

    #[test]
    fn pixel_extremes_are_exact() {
        let v = normalize(&[0, 255, 128]);

        assert_eq!(v[0], 0.0);
        assert_eq!(v[1], 1.0);
        assert!((v[2] - 128.0 / 255.0).abs() < f32::EPSILON);
    }

    #[test]
    fn decodes_images_row_major() {
        let mut reader = IdxReader::new("images", idx(&[2051, 2, 2, 2], &[0, 128, 255, 64, 255, 255, 255, 255]));
        let header = reader.read_header(IdxLayout::IMAGES).unwrap();

        let images = decode_images(reader, &header).unwrap();

        assert_eq!(images.dim(), (2, 4));
        let expected: [f32; 4] = [0.0, 0.502, 1.0, 0.251];
        for (got, want) in images.row(0).iter().zip(expected) {
            assert!((got - want).abs() < 1e-3, "{got} != {want}");
        }
        assert!(images.row(1).iter().all(|&p| p == 1.0));
        assert!(images.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn decodes_labels_as_one_hot() {
        let mut reader = IdxReader::new("labels", idx(&[2049, 3], &[3, 9, 0]));
        let header = reader.read_header(IdxLayout::LABELS).unwrap();

        let labels = decode_labels(reader, &header).unwrap();

        assert_eq!(labels.dim(), (3, NUM_CLASSES));
        for (row, label) in labels.rows().into_iter().zip([3usize, 9, 0]) {
            assert_eq!(row[label], 1.0);
            assert_eq!(row.iter().filter(|&&x| x == 0.0).count(), NUM_CLASSES - 1);
        }
    }

    #[test]
    fn out_of_range_label_fails_whole_decode() {
        let mut reader = IdxReader::new("labels", idx(&[2049, 3], &[1, 10, 2]));
        let header = reader.read_header(IdxLayout::LABELS).unwrap();

        let err = decode_labels(reader, &header).unwrap_err();

        match err {
            DatasetError::Range {
                file,
                index,
                label,
                classes,
            } => {
                assert_eq!(file, "labels");
                assert_eq!(index, 1);
                assert_eq!(label, 10);
                assert_eq!(classes, NUM_CLASSES);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn lazy_and_eager_decoding_agree() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(3 * 6).collect();
        let fields = [2051, 3, 2, 3];

        let mut eager_reader = IdxReader::new("images", idx(&fields, &payload));
        let header = eager_reader.read_header(IdxLayout::IMAGES).unwrap();
        let eager = decode_images(eager_reader, &header).unwrap();

        let mut lazy_reader = IdxReader::new("images", idx(&fields, &payload));
        let header = lazy_reader.read_header(IdxLayout::IMAGES).unwrap();
        let lazy: Vec<Array1<f32>> = image_samples(lazy_reader, &header)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(lazy.len(), 3);
        for (i, sample) in lazy.iter().enumerate() {
            assert_eq!(sample, &eager.row(i));
        }
    }

    #[test]
    fn truncated_images_are_a_format_failure() {
        let mut reader = IdxReader::new("images", idx(&[2051, 2, 2, 2], &[1, 2, 3, 4, 5]));
        let header = reader.read_header(IdxLayout::IMAGES).unwrap();

        let err = decode_images(reader, &header).unwrap_err();

        assert!(matches!(
            err,
            DatasetError::Format {
                reason: FormatError::TruncatedRecords { index: 1, count: 2 },
                ..
            }
        ));
    }

    #[test]
    fn huge_record_count_with_short_payload_is_truncated() {
        let mut reader = IdxReader::new("labels", idx(&[2049, u32::MAX], &[3, 9]));
        let header = reader.read_header(IdxLayout::LABELS).unwrap();

        let err = decode_labels(reader, &header).unwrap_err();

        match err {
            DatasetError::Format {
                reason: FormatError::TruncatedRecords { index, count },
                ..
            } => {
                assert_eq!(index, 2);
                assert_eq!(count, u32::MAX as usize);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn labels_need_one_byte_records() {
        let mut reader = IdxReader::new("images", idx(&[2051, 2, 0, 2], &[]));
        let header = reader.read_header(IdxLayout::IMAGES).unwrap();

        let err = decode_labels(reader, &header).unwrap_err();

        assert!(matches!(
            err,
            DatasetError::Format {
                reason: FormatError::RecordLength {
                    expected: 1,
                    actual: 0
                },
                ..
            }
        ));
    }
}
