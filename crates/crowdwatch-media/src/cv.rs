//! Conversions between `image`/`ndarray` buffers and OpenCV matrices.

use image::GrayImage;
use ndarray::Array2;
use opencv::core::{Mat, Vec2f};
use opencv::prelude::*;

/// Owned 8-bit single-channel matrix copied from `gray`.
pub(crate) fn gray_mat(gray: &GrayImage) -> opencv::Result<Mat> {
    let view = Mat::new_rows_cols_with_data(
        gray.height() as i32,
        gray.width() as i32,
        gray.as_raw().as_slice(),
    )?;
    view.try_clone()
}

/// Split a `CV_32FC2` flow matrix into its x and y components.
pub(crate) fn flow_components(flow: &Mat) -> opencv::Result<(Array2<f32>, Array2<f32>)> {
    let (rows, cols) = (flow.rows() as usize, flow.cols() as usize);
    let data = flow.data_typed::<Vec2f>()?;
    let dx = Array2::from_shape_fn((rows, cols), |(y, x)| data[y * cols + x][0]);
    let dy = Array2::from_shape_fn((rows, cols), |(y, x)| data[y * cols + x][1]);
    Ok((dx, dy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_gray_mat_copies_pixels() {
        let mut gray = GrayImage::from_pixel(5, 3, Luma([7]));
        gray.put_pixel(4, 2, Luma([200]));

        let mat = gray_mat(&gray).unwrap();
        assert_eq!((mat.rows(), mat.cols()), (3, 5));
        assert_eq!(*mat.at_2d::<u8>(2, 4).unwrap(), 200);
        assert_eq!(*mat.at_2d::<u8>(0, 0).unwrap(), 7);
    }
}
