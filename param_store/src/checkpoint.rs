use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{Optimizer, ParameterStore, Result, StoreErr, TensorSpec};

/// One serialized tensor: its name, shape and flat values.
///
/// A checkpoint is the ordered list of these records, matching the store's
/// layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// Serializes all of the store's tensors to `path`.
///
/// # Arguments
/// * `store` - The parameter store to snapshot.
/// * `path` - Destination file, overwritten if present.
pub fn save<O: Optimizer + Send>(store: &ParameterStore<O>, path: &Path) -> Result<()> {
    let mut flat = vec![0.0; store.len()];
    store.read_into(&mut flat)?;

    let mut records = Vec::new();
    let mut offset = 0;
    for spec in store.layout() {
        let len = spec.len();
        records.push(TensorRecord {
            name: spec.name,
            shape: spec.shape,
            values: flat[offset..offset + len].to_vec(),
        });
        offset += len;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &records)?;
    writer.flush()?;
    Ok(())
}

/// Reads a checkpoint written by [`save`].
pub fn load(path: &Path) -> Result<Vec<TensorRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let records = serde_json::from_reader(reader)?;
    Ok(records)
}

/// Flattens checkpoint records into one parameter vector, validating them
/// against a layout.
///
/// # Arguments
/// * `records` - Records in checkpoint order.
/// * `layout` - The layout the records must match, name by name.
///
/// # Returns
/// A `TensorMismatch` error on any name, shape or ordering difference.
pub fn flatten(records: &[TensorRecord], layout: &[TensorSpec]) -> Result<Vec<f32>> {
    if records.len() != layout.len() {
        return Err(StoreErr::SizeMismatch {
            what: "checkpoint records",
            got: records.len(),
            expected: layout.len(),
        });
    }

    let mut flat = Vec::new();
    for (record, spec) in records.iter().zip(layout) {
        if record.name != spec.name {
            return Err(StoreErr::TensorMismatch {
                name: record.name.clone(),
                detail: "unexpected name at this position",
            });
        }
        if record.shape != spec.shape || record.values.len() != spec.len() {
            return Err(StoreErr::TensorMismatch {
                name: record.name.clone(),
                detail: "shape does not match the layout",
            });
        }
        flat.extend_from_slice(&record.values);
    }

    Ok(flat)
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    struct NoopOptimizer;

    impl Optimizer for NoopOptimizer {
        fn update_params(&mut self, _params: &mut [f32], _grad: &[f32]) {}
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(format!("{}-{}.json", name, std::process::id()))
    }

    fn build_store() -> ParameterStore<NoopOptimizer> {
        let layout = vec![
            TensorSpec::new("cell/w", vec![3, 2]),
            TensorSpec::new("cell/b", vec![2]),
        ];
        let init: Vec<f32> = vec![0.5, -1.25, 3.0, 0.0625, -7.5, 2.25, 0.1, -0.1];
        ParameterStore::new(layout, &init, 0.0, |_| NoopOptimizer).unwrap()
    }

    #[test]
    fn test_checkpoint_round_trip_is_exact() {
        let store = build_store();
        let path = temp_path("checkpoint-roundtrip");

        save(&store, &path).unwrap();
        let records = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let flat = flatten(&records, &store.layout()).unwrap();
        let mut expected = vec![0.0; store.len()];
        store.read_into(&mut expected).unwrap();
        assert_eq!(flat, expected);
    }

    #[test]
    fn test_flatten_rejects_renamed_tensor() {
        let store = build_store();
        let path = temp_path("checkpoint-renamed");

        save(&store, &path).unwrap();
        let mut records = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        records[0].name = "other/w".to_string();
        assert!(flatten(&records, &store.layout()).is_err());
    }

    #[test]
    fn test_flatten_rejects_reshaped_tensor() {
        let store = build_store();
        let mut records = vec![
            TensorRecord {
                name: "cell/w".to_string(),
                shape: vec![2, 3],
                values: vec![0.0; 6],
            },
            TensorRecord {
                name: "cell/b".to_string(),
                shape: vec![2],
                values: vec![0.0; 2],
            },
        ];
        assert!(flatten(&records, &store.layout()).is_err());
        records[0].shape = vec![3, 2];
        assert!(flatten(&records, &store.layout()).is_ok());
    }
}
