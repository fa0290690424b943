//! Symbolic shape propagation through the U-Net graph.
//!
//! A [`ShapePlan`] walks the same wiring as [`UNet::forward`](crate::UNet::forward)
//! but only tracks [`FeatureShape`]s, so it is free to build for any
//! configuration. Pooling floors odd sizes exactly like the runtime does;
//! a skip whose size no longer matches its upsampled partner is reported
//! by [`ShapePlan::skip_mismatches`].

use serde::{Deserialize, Serialize};
use unet_types::FeatureShape;

use crate::config::UNetConfig;

/// Position of a node in the encoder-decoder graph.
///
/// Levels are 1-based, counted from the full-resolution stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// The raw input.
    Input,
    /// Conv block output of an encoder stage (the skip tensor).
    Encoder(usize),
    /// Max-pooled output of an encoder stage.
    Pool(usize),
    /// The bottleneck conv block.
    Bottleneck,
    /// Transposed-convolution output of a decoder stage.
    Upsample(usize),
    /// Concatenated (and optionally fused) output of a decoder stage.
    Decoder(usize),
    /// Classifier head output.
    Output,
}

/// One tensor node and its shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanNode {
    /// Node name, e.g. `encoder_2` or `decoder_1`.
    pub name: String,
    /// Graph position.
    pub stage: Stage,
    /// Shape per batch element.
    pub shape: FeatureShape,
}

/// Shapes of every tensor node for one configuration.
///
/// # Example
///
/// ```
/// use unet_models::{ShapePlan, UNetConfig};
/// use unet_types::FeatureShape;
///
/// let plan = ShapePlan::from_config(&UNetConfig::default());
/// let sides: Vec<usize> = plan.pooled().iter().map(|s| s.height).collect();
/// assert_eq!(sides, vec![64, 32, 16, 8]);
/// assert_eq!(plan.output(), FeatureShape::new(128, 128, 8));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapePlan {
    nodes: Vec<PlanNode>,
}

impl ShapePlan {
    /// Propagates shapes through the graph described by `config`.
    #[must_use]
    pub fn from_config(config: &UNetConfig) -> Self {
        let mut nodes = Vec::with_capacity(4 * config.depth + 3);
        let mut push = |stage: Stage, name: String, shape: FeatureShape| {
            nodes.push(PlanNode { name, stage, shape });
        };

        let mut current = config.input_shape.feature();
        push(Stage::Input, "input".to_string(), current);

        let mut skips = Vec::with_capacity(config.depth);
        for (idx, filters) in config.encoder_filters().into_iter().enumerate() {
            let level = idx + 1;
            let skip = current.with_channels(filters);
            push(Stage::Encoder(level), format!("encoder_{level}"), skip);
            current = skip.halved();
            push(Stage::Pool(level), format!("pool_{level}"), current);
            skips.push(skip);
        }

        current = current.with_channels(config.bottleneck_filters());
        push(Stage::Bottleneck, "bottleneck".to_string(), current);

        for (idx, filters) in config.decoder_filters().into_iter().enumerate() {
            let level = idx + 1;
            let up = current.doubled().with_channels(filters);
            push(Stage::Upsample(level), format!("upsample_{level}"), up);

            // Channel count is what matters downstream; spatial agreement is
            // checked separately.
            let skip_channels = skips.pop().map_or(0, |s| s.channels);
            current = if config.fuse_skip {
                up
            } else {
                up.with_channels(filters + skip_channels)
            };
            push(Stage::Decoder(level), format!("decoder_{level}"), current);
        }

        current = current.with_channels(config.num_classes);
        push(Stage::Output, "output".to_string(), current);

        Self { nodes }
    }

    /// All nodes in evaluation order.
    #[must_use]
    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    /// Looks up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&PlanNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    fn shapes_where(&self, pred: impl Fn(Stage) -> bool) -> Vec<FeatureShape> {
        self.nodes
            .iter()
            .filter(|n| pred(n.stage))
            .map(|n| n.shape)
            .collect()
    }

    fn shape_of(&self, stage: Stage) -> FeatureShape {
        self.nodes
            .iter()
            .find(|n| n.stage == stage)
            .map_or(FeatureShape::new(0, 0, 0), |n| n.shape)
    }

    /// Input node shape.
    #[must_use]
    pub fn input(&self) -> FeatureShape {
        self.shape_of(Stage::Input)
    }

    /// Skip tensor shapes, shallowest first.
    #[must_use]
    pub fn skips(&self) -> Vec<FeatureShape> {
        self.shapes_where(|s| matches!(s, Stage::Encoder(_)))
    }

    /// Pooled tensor shapes, shallowest first.
    #[must_use]
    pub fn pooled(&self) -> Vec<FeatureShape> {
        self.shapes_where(|s| matches!(s, Stage::Pool(_)))
    }

    /// Bottleneck shape.
    #[must_use]
    pub fn bottleneck(&self) -> FeatureShape {
        self.shape_of(Stage::Bottleneck)
    }

    /// Transposed-convolution output shapes, deepest first.
    #[must_use]
    pub fn upsampled(&self) -> Vec<FeatureShape> {
        self.shapes_where(|s| matches!(s, Stage::Upsample(_)))
    }

    /// Decoder stage output shapes, deepest first.
    #[must_use]
    pub fn decoded(&self) -> Vec<FeatureShape> {
        self.shapes_where(|s| matches!(s, Stage::Decoder(_)))
    }

    /// Output node shape.
    #[must_use]
    pub fn output(&self) -> FeatureShape {
        self.shape_of(Stage::Output)
    }

    /// Decoder levels whose upsampled tensor cannot be concatenated with its
    /// skip, as `(level, upsampled, skip)`.
    ///
    /// Empty whenever the input is divisible by `2^depth`.
    #[must_use]
    pub fn skip_mismatches(&self) -> Vec<(usize, FeatureShape, FeatureShape)> {
        self.upsampled()
            .into_iter()
            .zip(self.skips().into_iter().rev())
            .enumerate()
            .filter(|(_, (up, skip))| !up.same_spatial(skip))
            .map(|(idx, (up, skip))| (idx + 1, up, skip))
            .collect()
    }

    /// Logs every node at debug level.
    pub fn trace(&self) {
        for node in &self.nodes {
            tracing::debug!(node = %node.name, shape = %node.shape, "unet graph node");
        }
    }
}
