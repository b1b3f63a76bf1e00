//! Model snapshot serialization: a structured document tree matching a
//! fixed schema, via `serde`/`serde_json` — this codebase's intended (if
//! previously disabled) serialization stack.
//!
//! Grounded on `model.cpp`'s save/load routines; schema from the original's
//! `{type:"Model", ...}` / `{type:"Layer", ...}` / `{type:"RELULayers", ...}`
//! document tree.

use crate::layer::DenseLayer;
use crate::layer_stack::{LayerStack, ReluLayer};
use crate::model::{Model, ModelConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Expected type {expected}, found {found}")]
    UnexpectedType { expected: &'static str, found: String },
    #[error("could not find .{0}")]
    MissingKey(&'static str),
    #[error("malformed numeric data in .{0}")]
    MalformedData(&'static str),
}

#[derive(Debug, Serialize, Deserialize)]
struct LayerDoc {
    #[serde(rename = "type")]
    ty: String,
    data: Vec<f32>,
    deltas: u64,
    input: usize,
    output: usize,
    min_io: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReluLayersDoc {
    #[serde(rename = "type")]
    ty: String,
    inner_size: usize,
    data: Vec<LayerDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelDoc {
    #[serde(rename = "type")]
    ty: String,
    name: String,
    generation: u64,
    card_out_width: usize,
    b: ReluLayersDoc,
    l: ReluLayersDoc,
    /// The pass-action head: a bare `Layer`, not a `RELULayers` stack (the
    /// original's `p` member has no activation — see `model.rs`).
    p: LayerDoc,
    #[serde(rename = "in")]
    card_in: ReluLayersDoc,
    you_in: ReluLayersDoc,
    card_out: ReluLayersDoc,
}

fn layer_to_doc(layer: &DenseLayer) -> LayerDoc {
    LayerDoc {
        ty: "Layer".to_string(),
        data: layer.raw_panels().to_vec(),
        deltas: 0,
        input: layer.in_size() + 1,
        output: layer.out_size(),
        min_io: layer.in_size().min(layer.out_size()),
    }
}

fn layer_from_doc(doc: &LayerDoc) -> Result<DenseLayer, PersistenceError> {
    if doc.ty != "Layer" {
        return Err(PersistenceError::UnexpectedType { expected: "Layer", found: doc.ty.clone() });
    }
    let in_size = doc.input.checked_sub(1).ok_or(PersistenceError::MalformedData("input"))?;
    let mut layer = DenseLayer::new(in_size, doc.output);
    layer.load_raw_panels(&doc.data).map_err(|_| PersistenceError::MalformedData("data"))?;
    Ok(layer)
}

fn relu_layers_to_doc(stack: &LayerStack) -> ReluLayersDoc {
    ReluLayersDoc {
        ty: "RELULayers".to_string(),
        inner_size: stack.inner_size(),
        data: stack.layers().iter().map(|l| layer_to_doc(l.dense())).collect(),
    }
}

fn relu_layers_from_doc(doc: &ReluLayersDoc) -> Result<LayerStack, PersistenceError> {
    if doc.ty != "RELULayers" {
        return Err(PersistenceError::UnexpectedType { expected: "RELULayers", found: doc.ty.clone() });
    }
    let mut widths = Vec::with_capacity(doc.data.len() + 1);
    for (i, layer_doc) in doc.data.iter().enumerate() {
        if i == 0 {
            let in_size = layer_doc.input.checked_sub(1).ok_or(PersistenceError::MalformedData("input"))?;
            widths.push(in_size);
        }
        widths.push(layer_doc.output);
    }
    if widths.len() < 2 {
        return Err(PersistenceError::MissingKey("data"));
    }
    let mut stack = LayerStack::new(&widths);
    for (i, layer_doc) in doc.data.iter().enumerate() {
        let layer = layer_from_doc(layer_doc)?;
        stack.replace_layer(i, ReluLayer::from_dense(layer));
    }
    Ok(stack)
}

/// Serializes `model` under `name` at publication `generation`.
pub fn to_document(model: &Model, name: &str, generation: u64) -> serde_json::Result<serde_json::Value> {
    let doc = ModelDoc {
        ty: "Model".to_string(),
        name: name.to_string(),
        generation,
        card_out_width: model.card_out_width(),
        b: relu_layers_to_doc(model.board_encoder_stack()),
        l: relu_layers_to_doc(model.trunk_stack()),
        p: layer_to_doc(model.pass_head_layer()),
        card_in: relu_layers_to_doc(model.card_encoder_stack()),
        you_in: relu_layers_to_doc(model.opp_card_encoder_stack()),
        card_out: relu_layers_to_doc(model.card_head_stack()),
    };
    serde_json::to_value(doc)
}

/// Deserializes a model plus its stored name and generation.
pub fn from_document(value: serde_json::Value) -> Result<(Model, String, u64), PersistenceError> {
    let doc: ModelDoc = serde_json::from_value(value).map_err(|_| PersistenceError::MalformedData("root"))?;
    if doc.ty != "Model" {
        return Err(PersistenceError::UnexpectedType { expected: "Model", found: doc.ty });
    }
    let board = relu_layers_from_doc(&doc.b)?;
    let card_in = relu_layers_from_doc(&doc.card_in)?;
    let you_in = relu_layers_from_doc(&doc.you_in)?;
    let trunk = relu_layers_from_doc(&doc.l)?;
    let pass = layer_from_doc(&doc.p)?;
    let card_out = relu_layers_from_doc(&doc.card_out)?;

    let cfg = ModelConfig::new(board.in_size(), card_in.in_size());
    let mut model = Model::new(&cfg);
    model.replace_stacks(board, card_in, you_in, trunk, pass, card_out);
    Ok((model, doc.name, doc.generation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn round_trips_preserving_forward_output() {
        let cfg = ModelConfig { board_in: 4, board_out: 3, card_in: 5, card_out: 2, trunk_hidden: vec![6], trunk_out: 4, card_head_hidden: vec![3] };
        let mut model = Model::new(&cfg);
        let mut rng = StdRng::seed_from_u64(9);
        model.randomize(&mut rng);

        let board = vec![0.2, 0.4, 0.1, 0.9];
        let own = vec![vec![1.0; 5]];
        let opp = vec![vec![0.3; 5]];
        let before = model.calc(&board, &own, &opp, true).values;

        let doc = to_document(&model, "duel", 7).unwrap();
        let (mut loaded, name, generation) = from_document(doc).unwrap();
        assert_eq!(name, "duel");
        assert_eq!(generation, 7);

        let after = loaded.calc(&board, &own, &opp, true).values;
        assert_eq!(before, after);
    }

    #[test]
    fn rejects_unexpected_top_level_type() {
        let value = serde_json::json!({"type": "NotAModel"});
        match from_document(value) {
            Err(PersistenceError::MalformedData(_)) | Err(PersistenceError::UnexpectedType { .. }) => {}
            other => panic!("expected a schema error, got {:?}", other.map(|_| ())),
        }
    }
}
