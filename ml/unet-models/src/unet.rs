//! The assembled U-Net segmentation model.

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use tracing::{info, warn};
use unet_types::{FeatureShape, InputShape, SegmentationMask};

use crate::blocks::{
    CHANNEL_DIM, ConvBlock, ConvBlockConfig, DecoderBlock, DecoderBlockConfig, EncoderBlock,
};
use crate::config::UNetConfig;
use crate::error::{ModelError, Result};
use crate::plan::ShapePlan;

/// Name the assembled model reports.
pub const UNET_NAME: &str = "UNET";

/// Every intermediate tensor of one forward pass.
///
/// Produced by [`UNet::forward_features`]. Encoder-side vectors are ordered
/// shallowest first; `decoded` is ordered deepest first, so `decoded[j]`
/// consumed `skips[depth - 1 - j]`.
#[derive(Debug, Clone)]
pub struct UNetFeatures<B: Backend> {
    /// Pre-pooling output of each encoder stage.
    pub skips: Vec<Tensor<B, 4>>,
    /// Pooled output of each encoder stage.
    pub pooled: Vec<Tensor<B, 4>>,
    /// Bottleneck conv block output.
    pub bottleneck: Tensor<B, 4>,
    /// Output of each decoder stage.
    pub decoded: Vec<Tensor<B, 4>>,
    /// Classifier head output.
    pub output: Tensor<B, 4>,
}

/// U-shaped encoder-decoder for pixel-wise semantic segmentation.
///
/// Architecture (default config):
///
/// ```text
/// input 3 ─ enc 64 ─────────────────────────────── cat ─ 1x1 conv ─ softmax
///             └ enc 128 ─────────────────── cat ─ up 64
///                 └ enc 256 ─────── cat ─ up 128
///                     └ enc 512 ─ cat ─ up 256
///                         └ bottleneck 1024 ─ up 512
/// ```
///
/// Each encoder stage halves the spatial size with 2x2 max pooling; each
/// decoder stage doubles it with a 2x2 transposed convolution and joins the
/// matching skip tensor on the channel axis.
///
/// Tensors are channels-first (`[batch, channels, height, width]`); use
/// [`UNet::forward_nhwc`] for channels-last data.
///
/// # Type Parameters
///
/// - `B`: The Burn backend (e.g., `NdArray`, `Wgpu`)
///
/// # Example
///
/// ```ignore
/// use unet_models::{UNet, UNetConfig};
///
/// let config = UNetConfig::new((128, 128, 3), 8);
/// let model = UNet::<MyBackend>::new(&config, &device);
///
/// let input = Tensor::zeros([1, 3, 128, 128], &device);
/// let probs = model.forward(input);
/// assert_eq!(probs.dims(), [1, 8, 128, 128]);
/// ```
#[derive(Debug, Module)]
pub struct UNet<B: Backend> {
    encoders: Vec<EncoderBlock<B>>,
    bottleneck: ConvBlock<B>,
    decoders: Vec<DecoderBlock<B>>,
    head: Conv2d<B>,
    config: Ignored<UNetConfig>,
}

impl<B: Backend> UNet<B> {
    /// Builds the network graph.
    ///
    /// The configuration is not validated; an input shape that cannot be
    /// halved `depth` times only fails once a forward pass concatenates
    /// mismatched tensors. Call [`UNetConfig::validate`] first to reject it
    /// up front.
    #[must_use]
    pub fn new(config: &UNetConfig, device: &B::Device) -> Self {
        let conv_config = |in_channels: usize, filters: usize| {
            ConvBlockConfig::new(in_channels, filters)
                .with_activation(config.activation)
                .with_normalization(config.normalization)
        };

        let mut in_channels = config.input_shape.channels;
        let mut skip_channels = Vec::with_capacity(config.depth);
        let mut encoders = Vec::with_capacity(config.depth);
        for filters in config.encoder_filters() {
            encoders.push(EncoderBlock::new(conv_config(in_channels, filters), device));
            skip_channels.push(filters);
            in_channels = filters;
        }

        let bottleneck = ConvBlock::new(
            conv_config(in_channels, config.bottleneck_filters()),
            device,
        );
        in_channels = config.bottleneck_filters();

        let mut decoders = Vec::with_capacity(config.depth);
        for filters in config.decoder_filters() {
            let skip = skip_channels.pop().unwrap_or_default();
            let mut block = DecoderBlockConfig::new(in_channels, skip, filters);
            if config.fuse_skip {
                block = block.with_fuse(config.activation, config.normalization);
            }
            in_channels = block.out_channels();
            decoders.push(DecoderBlock::new(block, device));
        }

        let head = Conv2dConfig::new([in_channels, config.num_classes], [1, 1]).init(device);

        let model = Self {
            encoders,
            bottleneck,
            decoders,
            head,
            config: Ignored(*config),
        };

        let plan = model.shape_plan();
        plan.trace();
        if !config.input_shape.is_divisible_by(config.spatial_divisor()) {
            warn!(
                input = %config.input_shape,
                divisor = config.spatial_divisor(),
                mismatched_levels = plan.skip_mismatches().len(),
                "U-Net input is not divisible by 2^depth; skip concatenation will fail"
            );
        }
        info!(
            name = UNET_NAME,
            input = %config.input_shape,
            classes = config.num_classes,
            depth = config.depth,
            params = model.num_params(),
            "Built U-Net"
        );

        model
    }

    /// Builds the network after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns the error from [`UNetConfig::validate`].
    pub fn try_new(config: &UNetConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config, device))
    }

    /// Runs the forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: Tensor of shape `[batch, channels, height, width]`
    ///
    /// # Returns
    ///
    /// Tensor of shape `[batch, num_classes, height, width]`; with the
    /// default softmax head each pixel's class channels sum to one.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.encoders.len());
        let mut x = input;
        for encoder in &self.encoders {
            let (skip, pooled) = encoder.forward(x);
            skips.push(skip);
            x = pooled;
        }

        x = self.bottleneck.forward(x);

        for (decoder, skip) in self.decoders.iter().zip(skips.into_iter().rev()) {
            x = decoder.forward(x, skip);
        }

        self.classify(x)
    }

    /// Runs the forward pass on channels-last `[batch, height, width, channels]`
    /// input and returns channels-last `[batch, height, width, num_classes]`.
    pub fn forward_nhwc(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward(input.permute([0, 3, 1, 2])).permute([0, 2, 3, 1])
    }

    /// Runs the forward pass and keeps every intermediate tensor.
    pub fn forward_features(&self, input: Tensor<B, 4>) -> UNetFeatures<B> {
        let depth = self.encoders.len();
        let mut skips = Vec::with_capacity(depth);
        let mut pooled = Vec::with_capacity(depth);
        let mut x = input;
        for encoder in &self.encoders {
            let (skip, down) = encoder.forward(x);
            skips.push(skip);
            pooled.push(down.clone());
            x = down;
        }

        let bottleneck = self.bottleneck.forward(x);

        let mut decoded = Vec::with_capacity(depth);
        let mut x = bottleneck.clone();
        for (decoder, skip) in self.decoders.iter().zip(skips.iter().rev()) {
            x = decoder.forward(x, skip.clone());
            decoded.push(x.clone());
        }

        let output = self.classify(x);

        UNetFeatures {
            skips,
            pooled,
            bottleneck,
            decoded,
            output,
        }
    }

    /// Runs the forward pass after checking the input against the bound
    /// shape.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShapeMismatch`] if the channel count differs
    /// from the bound input, a dimension is zero, or the spatial size is not
    /// a multiple of `2^depth`.
    pub fn try_forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        self.check_input(input.dims())?;
        Ok(self.forward(input))
    }

    /// Predicts one class mask per batch element by taking the most likely
    /// class of every pixel.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShapeMismatch`] for an input rejected by
    /// [`try_forward`](Self::try_forward), [`ModelError::TensorData`] if the
    /// class indices cannot be read back, and [`ModelError::Types`] if the
    /// model has more classes than a mask can hold.
    pub fn predict_masks(&self, input: Tensor<B, 4>) -> Result<Vec<SegmentationMask>> {
        let [_, _, height, width] = input.dims();
        let probs = self.try_forward(input)?;

        let indices = probs
            .argmax(CHANNEL_DIM)
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| ModelError::tensor_data(format!("{e:?}")))?;

        indices
            .chunks(height * width)
            .map(|pixels| {
                SegmentationMask::from_class_indices(width, height, pixels).map_err(Into::into)
            })
            .collect()
    }

    fn classify(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.config
            .0
            .output_activation
            .apply(self.head.forward(x), CHANNEL_DIM)
    }

    fn check_input(&self, dims: [usize; 4]) -> Result<()> {
        let shape = FeatureShape::from_nchw(dims);
        let expected_channels = self.config.0.input_shape.channels;
        let divisor = self.config.0.spatial_divisor();

        let bad_size = dims.contains(&0)
            || shape.height % divisor != 0
            || shape.width % divisor != 0;
        if shape.channels != expected_channels || bad_size {
            return Err(ModelError::shape_mismatch(
                format!("[N, {expected_channels}, H, W] with H and W multiples of {divisor}"),
                format!("{dims:?}"),
            ));
        }
        Ok(())
    }

    /// Returns the configuration the model was built from.
    #[must_use]
    pub fn config(&self) -> &UNetConfig {
        &self.config.0
    }

    /// Returns the bound input shape.
    #[must_use]
    pub fn input_shape(&self) -> InputShape {
        self.config.0.input_shape
    }

    /// Returns the number of output classes.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.config.0.num_classes
    }

    /// Returns the number of encoder (and decoder) stages.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.encoders.len()
    }

    /// Returns the model name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        UNET_NAME
    }

    /// Returns the symbolic shapes of every node for the bound input.
    #[must_use]
    pub fn shape_plan(&self) -> ShapePlan {
        ShapePlan::from_config(&self.config.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::activation::OutputActivation;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    fn small_config() -> UNetConfig {
        UNetConfig::new((32, 32, 3), 5).with_base_filters(2)
    }

    #[test]
    fn model_forward_shape() {
        let model = UNet::<TestBackend>::new(&small_config(), &device());
        let out = model.forward(Tensor::zeros([2, 3, 32, 32], &device()));
        assert_eq!(out.dims(), [2, 5, 32, 32]);
    }

    #[test]
    fn model_forward_non_square() {
        let config = UNetConfig::new((32, 64, 1), 3).with_base_filters(2);
        let model = UNet::<TestBackend>::new(&config, &device());
        let out = model.forward(Tensor::zeros([1, 1, 32, 64], &device()));
        assert_eq!(out.dims(), [1, 3, 32, 64]);
    }

    #[test]
    fn model_forward_nhwc_shape() {
        let model = UNet::<TestBackend>::new(&small_config(), &device());
        let out = model.forward_nhwc(Tensor::zeros([1, 32, 32, 3], &device()));
        assert_eq!(out.dims(), [1, 32, 32, 5]);
    }

    #[test]
    fn model_softmax_output_is_distribution() {
        let model = UNet::<TestBackend>::new(&small_config(), &device());
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device());
        let out = model.forward(input);

        let sums = out.clone().sum_dim(CHANNEL_DIM).into_data().to_vec::<f32>().unwrap();
        assert_eq!(sums.len(), 32 * 32);
        for s in sums {
            approx::assert_relative_eq!(s, 1.0, epsilon = 1e-4);
        }

        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn model_features_match_plan() {
        let model = UNet::<TestBackend>::new(&small_config(), &device());
        let plan = model.shape_plan();
        let features = model.forward_features(Tensor::zeros([1, 3, 32, 32], &device()));

        let dims = |t: &Tensor<TestBackend, 4>| FeatureShape::from_nchw(t.dims());
        assert_eq!(features.skips.iter().map(dims).collect::<Vec<_>>(), plan.skips());
        assert_eq!(features.pooled.iter().map(dims).collect::<Vec<_>>(), plan.pooled());
        assert_eq!(dims(&features.bottleneck), plan.bottleneck());
        assert_eq!(features.decoded.iter().map(dims).collect::<Vec<_>>(), plan.decoded());
        assert_eq!(dims(&features.output), plan.output());
    }

    #[test]
    fn model_features_output_matches_forward() {
        let model = UNet::<TestBackend>::new(&small_config(), &device());
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device());

        let direct = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let via_features = model
            .forward_features(input)
            .output
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert_eq!(direct.len(), via_features.len());
        for (a, b) in direct.iter().zip(&via_features) {
            approx::assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn model_try_forward_rejects_bad_input() {
        let model = UNet::<TestBackend>::new(&small_config(), &device());

        let wrong_channels = model.try_forward(Tensor::zeros([1, 1, 32, 32], &device()));
        assert!(matches!(wrong_channels, Err(ModelError::ShapeMismatch { .. })));

        let indivisible = model.try_forward(Tensor::zeros([1, 3, 40, 32], &device()));
        assert!(matches!(indivisible, Err(ModelError::ShapeMismatch { .. })));

        let empty_batch = model.try_forward(Tensor::zeros([0, 3, 32, 32], &device()));
        assert!(matches!(empty_batch, Err(ModelError::ShapeMismatch { .. })));

        // Fully convolutional: other multiples of 16 are accepted
        let larger = model.try_forward(Tensor::zeros([1, 3, 48, 16], &device()));
        assert_eq!(larger.map(|t| t.dims()).unwrap(), [1, 5, 48, 16]);
    }

    #[test]
    fn model_try_new_validates() {
        let bad = UNetConfig::new((30, 30, 3), 2).with_base_filters(2);
        assert!(UNet::<TestBackend>::try_new(&bad, &device()).is_err());
        assert!(UNet::<TestBackend>::try_new(&small_config(), &device()).is_ok());
    }

    #[test]
    fn model_predict_masks() {
        let model = UNet::<TestBackend>::new(&small_config(), &device());
        let masks = model
            .predict_masks(Tensor::ones([3, 3, 32, 32], &device()))
            .unwrap();

        assert_eq!(masks.len(), 3);
        for mask in &masks {
            assert_eq!((mask.width(), mask.height()), (32, 32));
            assert!(mask.data().iter().all(|&c| usize::from(c) < 5));
        }
    }

    #[test]
    fn model_predict_masks_with_logits_head() {
        let config = small_config().with_output_activation(OutputActivation::Logits);
        let model = UNet::<TestBackend>::new(&config, &device());
        let masks = model
            .predict_masks(Tensor::zeros([1, 3, 32, 32], &device()))
            .unwrap();
        assert_eq!(masks.len(), 1);
    }

    #[test]
    fn model_accessors() {
        let config = UNetConfig::new((64, 64, 1), 2).with_base_filters(2).with_depth(3);
        let model = UNet::<TestBackend>::new(&config, &device());

        assert_eq!(model.name(), "UNET");
        assert_eq!(model.input_shape(), InputShape::new(64, 64, 1));
        assert_eq!(model.num_classes(), 2);
        assert_eq!(model.depth(), 3);
        assert_eq!(model.config(), &config);
        assert_eq!(model.shape_plan().pooled().len(), 3);
    }

    #[test]
    fn model_param_count_tracks_width() {
        let narrow = UNet::<TestBackend>::new(&small_config(), &device());
        let wide = UNet::<TestBackend>::new(&small_config().with_base_filters(4), &device());
        assert!(wide.num_params() > narrow.num_params());
    }
}
