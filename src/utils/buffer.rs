use object_pool::{Pool, Reusable};
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;

use crate::float::Float;

pub fn new_real_buffer<T: Float>(size: usize) -> Vec<T> {
    vec![T::zero(); size]
}

pub fn new_complex_buffer<T: Float>(size: usize) -> Vec<Complex<T>> {
    vec![Complex::zero(); size]
}

/// Copy `input` into the real parts of `output`, zeroing everything else.
pub fn copy_real_to_complex<T: Float>(input: &[T], output: &mut [Complex<T>]) {
    assert!(input.len() <= output.len());
    input.iter().zip(output.iter_mut()).for_each(|(i, o)| {
        o.re = *i;
        o.im = T::zero();
    });
    output[input.len()..]
        .iter_mut()
        .for_each(|o| *o = Complex::zero())
}

/// Copy the real parts of `input` into `output`, zero-filling any remainder.
pub fn copy_complex_to_real<T: Float>(input: &[Complex<T>], output: &mut [T]) {
    let n = input.len().min(output.len());
    input[..n]
        .iter()
        .map(|c| c.re)
        .zip(output.iter_mut())
        .for_each(|(i, o)| *o = i);

    output[n..].iter_mut().for_each(|o| *o = T::zero());
}

/// Computes |x|^2 for each complex value x in `arr`. This function
/// modifies `arr` in place and leaves the complex component zero.
pub fn modulus_squared<T: Float>(arr: &mut [Complex<T>]) {
    for s in arr {
        s.re = s.re * s.re + s.im * s.im;
        s.im = T::zero();
    }
}

/// Compute the sum of the square of each element of `arr`.
pub fn square_sum<T: Float>(arr: &[T]) -> T {
    arr.iter().map(|&s| s * s).sum::<T>()
}

/// Root mean square of `arr`; zero for an empty slice.
pub fn rms<T: Float>(arr: &[T]) -> T {
    if arr.is_empty() {
        return T::zero();
    }
    (square_sum(arr) / T::from_len(arr.len())).sqrt()
}

/// Subtract the mean of `arr` from every element.
pub fn remove_dc<T: Float>(arr: &mut [T]) {
    if arr.is_empty() {
        return;
    }
    let mean = arr.iter().copied().sum::<T>() / T::from_len(arr.len());
    arr.iter_mut().for_each(|x| *x = *x - mean);
}

/// A symmetric Hann window of length `size`.
pub fn hann_window<T: Float>(size: usize) -> Vec<T> {
    if size < 2 {
        return vec![T::one(); size];
    }
    let two_pi = T::cast(2.0 * std::f64::consts::PI);
    let denom = T::from_len(size - 1);
    let half = T::cast(0.5);
    (0..size)
        .map(|i| half - half * (two_pi * T::from_len(i) / denom).cos())
        .collect()
}

/// A pool of real/complex buffer objects. Buffers are dynamically created as needed
/// and reused if previously `Drop`ed. Buffers are never freed. Instead buffers are kept
/// in reserve and reused when a new buffer is requested.
///
/// ```rust
/// use intonation::utils::buffer::BufferPool;
///
/// let buffers = BufferPool::new(3);
/// let mut buf1 = buffers.get_real_buffer();
/// buf1[0] = 5.5;
/// {
///     // This buffer will be dropped when the scope ends
///     let mut buf2 = buffers.get_real_buffer();
///     buf2[1] = 6.6;
/// }
/// // The buffer that was just released is handed out again.
/// let buf3 = buffers.get_real_buffer();
/// assert_eq!(&buf3[..], &[0.0, 6.6, 0.0]);
/// assert_eq!(&buf1[..], &[5.5, 0.0, 0.0]);
/// ```
pub struct BufferPool<T> {
    real_buffers: Pool<Vec<T>>,
    complex_buffers: Pool<Vec<Complex<T>>>,
    pub buffer_size: usize,
}

impl<T: Float> BufferPool<T> {
    pub fn new(buffer_size: usize) -> Self {
        BufferPool {
            real_buffers: Pool::new(0, || new_real_buffer(buffer_size)),
            complex_buffers: Pool::new(0, || new_complex_buffer(buffer_size)),
            buffer_size,
        }
    }
    /// Get a reference to a buffer that can be used until it is `Drop`ed.
    /// Reused buffers keep whatever the previous user wrote into them.
    pub fn get_real_buffer(&self) -> Reusable<'_, Vec<T>> {
        let size = self.buffer_size;
        self.real_buffers.pull(move || new_real_buffer(size))
    }
    /// Get a reference to a buffer that can be used until it is `Drop`ed.
    pub fn get_complex_buffer(&self) -> Reusable<'_, Vec<Complex<T>>> {
        let size = self.buffer_size;
        self.complex_buffers.pull(move || new_complex_buffer(size))
    }
}
