//! Neural network inference with `tract`.

use std::{fmt, ops::Index, ops::RangeInclusive, path::Path, sync::Arc};

use anyhow::{bail, Context};
use handmarker_image::{Color, Image, Rect, Resolution};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A neural network that can be used for inference.
pub struct NeuralNetwork {
    inner: Model,
}

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!("neural network path must have `.onnx` extension"),
        }

        let model_data =
            std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
        Self::from_onnx(&model_data)
    }

    /// Loads and optimizes a pre-trained model from an in-memory ONNX file.
    ///
    /// Returns an error if the network data is malformed, if the network data is incomplete, or if
    /// the network uses unimplemented operations.
    pub fn from_onnx(raw: &[u8]) -> anyhow::Result<Self> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*raw)?
            .into_optimized()?;
        let outputs = graph.output_outlets()?.to_vec();
        let inner = SimplePlan::new_for_outputs(graph, &outputs)?;
        Ok(Self { inner })
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.inner.model().inputs.len()
    }

    /// Returns the shape of the input node `index`.
    pub fn input_shape(&self, index: usize) -> anyhow::Result<Vec<usize>> {
        let fact = self.inner.model().input_fact(index)?;
        match fact.shape.as_concrete() {
            Some(shape) => Ok(shape.to_vec()),
            None => bail!("network input {index} has a symbolic shape"),
        }
    }

    /// Runs the network on a set of input tensors, returning the estimated outputs.
    pub fn estimate(&self, inputs: Vec<Tensor>) -> anyhow::Result<Outputs> {
        let inputs = inputs
            .into_iter()
            .map(|t| {
                let tract = tract_onnx::prelude::Tensor::from_shape(&t.shape, &t.data)?;
                Ok(TValue::from_const(Arc::new(tract)))
            })
            .collect::<anyhow::Result<TVec<_>>>()?;

        let outputs = self.inner.run(inputs)?;
        let inner = outputs
            .iter()
            .map(|tract| {
                Ok(Tensor {
                    shape: tract.shape().to_vec(),
                    data: tract.as_slice::<f32>()?.to_vec(),
                })
            })
            .collect::<anyhow::Result<_>>()?;
        Ok(Outputs { inner })
    }
}

/// A dense `f32` tensor.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor from row-major `data`.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> anyhow::Result<Self> {
        let len = shape.iter().product::<usize>();
        if len != data.len() {
            bail!(
                "tensor shape {:?} needs {} elements, got {}",
                shape,
                len,
                data.len()
            );
        }
        Ok(Self { shape, data })
    }

    /// Creates a tensor of the given shape, computing each element with `f`.
    ///
    /// `f` is called in row-major order with the element's index.
    pub fn from_shape_fn<const N: usize>(
        shape: [usize; N],
        mut f: impl FnMut([usize; N]) -> f32,
    ) -> Self {
        let len = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut index = [0; N];
        for _ in 0..len {
            data.push(f(index));
            for dim in (0..N).rev() {
                index[dim] += 1;
                if index[dim] < shape[dim] {
                    break;
                }
                index[dim] = 0;
            }
        }
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns all elements in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor({:?})", self.shape)
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: Vec<Tensor>,
}

impl Outputs {
    #[cfg(test)]
    pub(crate) fn from_tensors(inner: Vec<Tensor>) -> Self {
        Self { inner }
    }

    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, fixed at 1.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CnnInputShape {
    /// Shape is `(N, C, H, W)`.
    NCHW,
    /// Shape is `(N, H, W, C)`.
    NHWC,
}

/// A convolutional neural network (CNN) that operates on image data.
pub struct Cnn {
    nn: NeuralNetwork,
    shape: CnnInputShape,
    input_res: Resolution,
    color_range: RangeInclusive<f32>,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input with a shape that matches `shape`. sRGB color
    /// values are mapped linearly to `color_range`.
    pub fn new(
        nn: NeuralNetwork,
        shape: CnnInputShape,
        color_range: RangeInclusive<f32>,
    ) -> anyhow::Result<Self> {
        if nn.num_inputs() != 1 {
            bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                nn.num_inputs(),
            );
        }

        let tensor_shape = nn.input_shape(0)?;
        let (w, h) = match (shape, &*tensor_shape) {
            (CnnInputShape::NCHW, [1, 3, h, w]) | (CnnInputShape::NHWC, [1, h, w, 3]) => (*w, *h),
            _ => bail!(
                "invalid model input shape for {:?} CNN: {:?}",
                shape,
                tensor_shape,
            ),
        };
        let input_res = Resolution::new(w.try_into()?, h.try_into()?);

        Ok(Self {
            nn,
            shape,
            input_res,
            color_range,
        })
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on the part of `image` covered by `region`.
    ///
    /// `region` is stretched to the network's input resolution. Parts of `region` outside of
    /// `image` are treated as black.
    pub fn estimate(&self, image: &Image, region: Rect) -> anyhow::Result<Outputs> {
        let tensor = self.input_tensor(image, region);
        self.nn.estimate(vec![tensor])
    }

    fn input_tensor(&self, image: &Image, region: Rect) -> Tensor {
        let (h, w) = (
            self.input_res.height() as usize,
            self.input_res.width() as usize,
        );
        let start = *self.color_range.start();
        let step = (*self.color_range.end() - start) / 255.0;
        let map = |color: Color, c: usize| color[c] as f32 * step + start;
        let sample = |x: usize, y: usize| {
            let u = (x as f32 + 0.5) / w as f32;
            let v = (y as f32 + 0.5) / h as f32;
            image.sample(
                region.x() + u * region.width(),
                region.y() + v * region.height(),
            )
        };

        match self.shape {
            CnnInputShape::NCHW => {
                Tensor::from_shape_fn([1, 3, h, w], |[_, c, y, x]| map(sample(x, y), c))
            }
            CnnInputShape::NHWC => {
                Tensor::from_shape_fn([1, h, w, 3], |[_, y, x, c]| map(sample(x, y), c))
            }
        }
    }
}
