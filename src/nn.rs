//! Neural Network inference.
//!
//! Networks are loaded from ONNX files and executed on the CPU with [`tract_onnx`].

use std::{
    borrow::Cow,
    ops::RangeInclusive,
    path::Path,
    sync::Arc,
};

use anyhow::Context;
use tract_onnx::prelude::*;

use crate::image::{Image, Resolution};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A convolutional neural network (CNN) that operates on image data.
///
/// The network takes a single RGB image in `[1, 3, H, W]` (NCHW) layout.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle to the underlying
/// data.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    input_res: Resolution,
    color_mapper: ColorMapper,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input of shape `[1, 3, H, W]`.
    pub fn new(nn: NeuralNetwork, color_mapper: ColorMapper) -> anyhow::Result<Self> {
        let input_res = Self::get_input_res(&nn)?;
        Ok(Self {
            nn,
            input_res,
            color_mapper,
        })
    }

    fn get_input_res(nn: &NeuralNetwork) -> anyhow::Result<Resolution> {
        if nn.num_inputs() != 1 {
            anyhow::bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                nn.num_inputs(),
            );
        }

        let tensor_shape = nn.inputs()[0].shape();
        let (w, h) = match tensor_shape {
            [1, 3, h, w] => (*w, *h),
            _ => anyhow::bail!(
                "invalid CNN input shape {:?}, expected [1, 3, H, W]",
                tensor_shape,
            ),
        };

        let (w, h): (u32, u32) = (w.try_into()?, h.try_into()?);
        Ok(Resolution::new(w, h))
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Returns the underlying [`NeuralNetwork`].
    #[inline]
    pub fn network(&self) -> &NeuralNetwork {
        &self.nn
    }

    /// Runs the network on an input image, returning the estimated outputs.
    ///
    /// The input image will be sampled to create the network's input tensor. If the image's aspect
    /// ratio does not match the network's input aspect ratio, the image will be stretched.
    pub fn estimate(&self, image: &Image) -> anyhow::Result<Outputs> {
        let tensor = self.image_to_tensor(image)?;
        self.nn.estimate(Inputs::from(tensor))
    }

    fn image_to_tensor(&self, image: &Image) -> anyhow::Result<Tensor> {
        let res = image.resolution();
        anyhow::ensure!(!res.is_empty(), "cannot run CNN on empty {} image", res);

        let (h, w) = (
            self.input_res.height() as usize,
            self.input_res.width() as usize,
        );
        // Nearest-neighbor sampling of the (stretched) input image.
        let sample = |x: usize, y: usize| -> [f32; 3] {
            let u = x as f32 / w as f32;
            let v = y as f32 / h as f32;
            let px = ((u * res.width() as f32).round() as u32).min(res.width() - 1);
            let py = ((v * res.height() as f32).round() as u32).min(res.height() - 1);
            self.color_mapper.map(image.get(px, py))
        };

        let array =
            tract_ndarray::Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| sample(x, y)[c]);
        Ok(array.into_tensor())
    }
}

/// Maps 8-bit sRGB colors to the value range a network expects.
#[derive(Clone, Debug)]
pub struct ColorMapper {
    target_range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Creates a simple color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// Note that this operates on *non-linear* sRGB colors, but maps them linearly to the target
    /// range.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        assert!(target_range.end() > target_range.start());
        Self { target_range }
    }

    fn map(&self, rgb: [u8; 3]) -> [f32; 3] {
        let start = *self.target_range.start();
        let end = *self.target_range.end();

        let adjust_range = (end - start) / 255.0;
        rgb.map(|col| col as f32 * adjust_range + start)
    }
}

/// Neural network loader.
pub struct Loader<'a> {
    model_data: Cow<'a, [u8]>,
    input_shape: Option<Vec<usize>>,
}

impl<'a> Loader<'a> {
    fn new(data: Cow<'a, [u8]>) -> Self {
        Self {
            model_data: data,
            input_shape: None,
        }
    }

    /// Fixes the shape of the network's first input.
    ///
    /// Many exported models declare a symbolic batch dimension. Pinning the shape lets the loader
    /// optimize the network for it, and makes loading fail if the network cannot accept inputs of
    /// this shape.
    pub fn with_input_shape(mut self, shape: &[usize]) -> Self {
        self.input_shape = Some(shape.to_vec());
        self
    }

    /// Loads and optimizes the network.
    ///
    /// Returns an error if the network data is malformed, if the network data is incomplete, if the
    /// network uses unimplemented operations, or if its inputs and outputs do not have a concrete
    /// shape.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let mut model = tract_onnx::onnx()
            .model_for_read(&mut &*self.model_data)
            .context("failed to parse ONNX model")?;
        if let Some(shape) = &self.input_shape {
            let shape = shape.iter().copied().collect::<TVec<usize>>();
            model = model.with_input_fact(0, f32::fact(shape).into())?;
        }
        let graph = model.into_optimized()?;

        let inputs = (0..graph.inputs.len())
            .map(|id| {
                let fact = graph.input_fact(id)?;
                let node = graph.input_outlets()?[id].node;
                TensorInfo::new(&graph.node(node).name, &fact.shape)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let outputs = (0..graph.outputs.len())
            .map(|id| {
                let fact = graph.output_fact(id)?;
                let node = graph.output_outlets()?[id].node;
                TensorInfo::new(&graph.node(node).name, &fact.shape)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let plan = SimplePlan::new(graph)?;

        Ok(NeuralNetwork(Arc::new(NeuralNetworkImpl {
            plan,
            inputs,
            outputs,
        })))
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures. Inference does not
/// mutate the network, so a single instance can serve any number of threads.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    plan: Model,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<'a, P: AsRef<Path>>(path: P) -> anyhow::Result<Loader<'a>> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl<'a>(path: &Path) -> anyhow::Result<Loader<'a>> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read model '{}'", path.display()))?;
        Ok(Loader::new(model_data.into()))
    }

    /// Loads a pre-trained model from an in-memory ONNX file.
    pub fn from_onnx(raw: &[u8]) -> Loader<'_> {
        Loader::new(raw.into())
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.inputs.len()
    }

    /// Returns information about the network's inputs.
    ///
    /// To perform inference, a matching input tensor has to be provided for each input.
    pub fn inputs(&self) -> &[TensorInfo] {
        &self.0.inputs
    }

    /// Returns information about the network's outputs.
    pub fn outputs(&self) -> &[TensorInfo] {
        &self.0.outputs
    }

    /// Runs the network on a set of [`Inputs`], returning the estimated [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: Inputs) -> anyhow::Result<Outputs> {
        anyhow::ensure!(
            inputs.len() == self.num_inputs(),
            "network takes {} inputs, got {}",
            self.num_inputs(),
            inputs.len(),
        );

        let outputs = self.0.plan.run(
            inputs
                .inner
                .into_iter()
                .map(|t| TValue::from_const(Arc::new(t)))
                .collect(),
        )?;
        Ok(Outputs {
            inner: outputs.into_iter().map(|v| v.into_tensor()).collect(),
        })
    }
}

/// Name and shape of a network input or output.
#[derive(Debug, Clone)]
pub struct TensorInfo {
    name: String,
    shape: Vec<usize>,
}

impl TensorInfo {
    fn new(name: &str, shape: &ShapeFact) -> anyhow::Result<Self> {
        let shape = shape
            .as_concrete()
            .with_context(|| format!("network tensor '{}' has symbolic shape {:?}", name, shape))?;
        Ok(Self {
            name: name.to_string(),
            shape: shape.to_vec(),
        })
    }

    /// Returns the tensor shape.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the name of the tensor's node.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: TVec<Tensor>,
}

impl Outputs {
    /// Returns the data of output `index` as a flat slice of `f32`s, checking its shape.
    pub fn f32_slice(&self, index: usize, expected_shape: &[usize]) -> anyhow::Result<&[f32]> {
        let tensor = self
            .inner
            .get(index)
            .with_context(|| format!("network produced no output #{}", index))?;
        anyhow::ensure!(
            tensor.shape() == expected_shape,
            "output #{} has shape {:?}, expected {:?}",
            index,
            tensor.shape(),
            expected_shape,
        );
        tensor.as_slice::<f32>()
    }
}

/// List of input tensors for neural network inference.
#[derive(Debug)]
pub struct Inputs {
    inner: TVec<Tensor>,
}

impl Inputs {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl From<Tensor> for Inputs {
    fn from(t: Tensor) -> Self {
        Self { inner: tvec![t] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_mapper() {
        let mapper = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(mapper.map([0, 0, 0]), [-1.0, -1.0, -1.0]);
        assert_eq!(mapper.map([255, 255, 255]), [1.0, 1.0, 1.0]);

        let mapper = ColorMapper::linear(0.0..=1.0);
        assert_eq!(mapper.map([0, 0, 0]), [0.0, 0.0, 0.0]);
        assert_eq!(mapper.map([255, 0, 255]), [1.0, 0.0, 1.0]);
    }

    #[test]
    fn requires_onnx_extension() {
        let err = NeuralNetwork::from_path("model.tflite").err().unwrap();
        assert!(err.to_string().contains("`.onnx` extension"), "{err}");

        assert!(NeuralNetwork::from_path("does/not/exist.onnx").is_err());
    }

    #[test]
    fn rejects_malformed_model() {
        assert!(NeuralNetwork::from_onnx(b"not a protobuf").load().is_err());
    }

    #[test]
    fn output_shape_is_checked() {
        let tensor = tract_ndarray::Array2::<f32>::from_elem((1, 3), 0.5).into_tensor();
        let outputs = Outputs {
            inner: tvec![tensor],
        };

        assert_eq!(outputs.f32_slice(0, &[1, 3]).unwrap(), &[0.5, 0.5, 0.5]);
        assert!(outputs.f32_slice(0, &[1, 4]).is_err());
        assert!(outputs.f32_slice(1, &[1, 3]).is_err());
    }
}
