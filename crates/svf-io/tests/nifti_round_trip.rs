use anyhow::Result;
use burn::tensor::{Shape, Tensor, TensorData};
use burn_ndarray::NdArray;
use svf_core::spatial::{Direction, Point, Spacing};
use svf_core::{Grid, Image, VectorField};
use svf_io::{read_image, read_vector_field, read_vector_fields, write_image, write_vector_field};
use tempfile::tempdir;

type B = NdArray<f32>;

fn ramp<const D: usize>(shape: [usize; D], scale: f32) -> Tensor<B, D> {
    let n: usize = shape.iter().product();
    let values: Vec<f32> = (0..n).map(|i| i as f32 * scale).collect();
    Tensor::from_data(TensorData::new(values, Shape::new(shape)), &Default::default())
}

fn assert_same<const D: usize>(a: &Tensor<B, D>, b: &Tensor<B, D>) {
    let a = a.to_data();
    let b = b.to_data();
    assert_eq!(a.shape, b.shape);
    assert_eq!(a.as_slice::<f32>().unwrap(), b.as_slice::<f32>().unwrap());
}

#[test]
fn test_image_round_trip_2d() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("image.nii");

    let image = Image::new(
        ramp([6, 4], 1.5),
        Point::new([-2.0, 7.5]),
        Spacing::new([0.5, 1.25]),
        Direction::identity(),
    );
    write_image(&path, &image)?;

    let read = read_image::<B, 2, _>(&path, &Default::default())?;
    assert!(read.grid().matches(image.grid()), "{:?}", read.grid());
    assert_same(read.data(), image.data());
    Ok(())
}

#[test]
fn test_image_round_trip_3d_rotated() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("volume.nii.gz");

    let direction = nalgebra::SMatrix::<f64, 3, 3>::new(
        0.0, -1.0, 0.0,
        1.0, 0.0, 0.0,
        0.0, 0.0, 1.0,
    );
    let image = Image::new(
        ramp([3, 4, 5], 1.0),
        Point::new([1.0, 2.0, 3.0]),
        Spacing::new([1.0, 2.0, 0.5]),
        Direction(direction),
    );
    write_image(&path, &image)?;

    let read = read_image::<B, 3, _>(&path, &Default::default())?;
    assert!(read.grid().matches(image.grid()), "{:?}", read.grid());
    assert_same(read.data(), image.data());
    Ok(())
}

#[test]
fn test_vector_field_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("field.nii");

    let grid = Grid::new(
        [3, 4, 5],
        Point::new([0.0, -1.0, 4.0]),
        Spacing::new([1.0, 1.5, 2.0]),
        Direction::identity(),
    );
    let field = VectorField::<B, 3>::from_components(
        grid,
        vec![ramp([3, 4, 5], 0.1), ramp([3, 4, 5], -0.2), ramp([3, 4, 5], 0.3)],
    )?;
    write_vector_field(&path, &field)?;

    let read = read_vector_field::<B, 3, _>(&path, &Default::default())?;
    assert!(read.grid().matches(field.grid()));
    for axis in 0..3 {
        assert_same(read.component(axis), field.component(axis));
    }
    Ok(())
}

#[test]
fn test_read_vector_fields_in_parallel() -> Result<()> {
    let dir = tempdir()?;
    let grid = Grid::<2>::with_size([5, 7]);

    let mut paths = Vec::new();
    for i in 0..4 {
        let path = dir.path().join(format!("velocity_{}.nii", i));
        let field = VectorField::<B, 2>::from_components(
            grid.clone(),
            vec![ramp([5, 7], i as f32), ramp([5, 7], -(i as f32))],
        )?;
        write_vector_field(&path, &field)?;
        paths.push(path);
    }

    let fields = read_vector_fields::<B, 2, _>(&paths, &Default::default())?;
    assert_eq!(fields.len(), 4);
    for (i, field) in fields.iter().enumerate() {
        assert!(field.grid().matches(&grid));
        assert_same(field.component(0), &ramp([5, 7], i as f32));
    }
    Ok(())
}

#[test]
fn test_scalar_image_is_not_a_vector_field() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("scalar.nii");

    let image = Image::new(ramp([4, 4], 1.0), Point::origin(), Spacing::uniform(1.0), Direction::identity());
    write_image(&path, &image)?;

    assert!(read_vector_field::<B, 2, _>(&path, &Default::default()).is_err());
    assert!(read_vector_fields::<B, 2, _>(&[path], &Default::default()).is_err());
    Ok(())
}
