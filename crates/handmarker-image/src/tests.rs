use super::*;
use Color as C;

fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Image {
    let mut image = Image::new(W as u32, H as u32);
    for (y, row) in data.iter().enumerate() {
        for (x, color) in row.iter().enumerate() {
            image.set(x as u32, y as u32, *color);
        }
    }
    image
}

#[test]
fn sample() {
    let image = mkimage([[C::RED, C::GREEN], [C::BLUE, C::WHITE]]);

    assert_eq!(image.sample(0.0, 0.0), C::RED);
    assert_eq!(image.sample(1.9, 0.2), C::GREEN);
    assert_eq!(image.sample(0.5, 1.5), C::BLUE);

    // Outside of the image, sampling yields transparent black.
    assert_eq!(image.sample(-0.1, 0.0), C::NONE);
    assert_eq!(image.sample(2.0, 0.0), C::NONE);
    assert_eq!(image.sample(0.0, 7.0), C::NONE);
}

#[test]
fn resized() {
    let image = mkimage([[C::RED, C::GREEN]]);
    let big = image.resized(Resolution::new(4, 2));
    assert_eq!(big.resolution(), Resolution::new(4, 2));
    assert_eq!(big.get(0, 0), C::RED);
    assert_eq!(big.get(0, 1), C::RED);
    assert_eq!(big.get(3, 0), C::GREEN);
    assert_eq!(big.get(3, 1), C::GREEN);
}

#[test]
fn clear() {
    let mut image = mkimage([[C::RED, C::GREEN]]);
    image.clear(C::BLUE);
    assert_eq!(image.get(0, 0), C::BLUE);
    assert_eq!(image.get(1, 0), C::BLUE);
}

#[test]
fn raw_data_layout() {
    let image = mkimage([[C::from_rgba8(1, 2, 3, 4), C::from_rgba8(5, 6, 7, 8)]]);
    assert_eq!(image.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn color_channels() {
    assert_eq!(C::from_rgb8(1, 2, 3), C::from_rgba8(1, 2, 3, 255));
    assert_eq!(C::MAGENTA[0], 255);
    assert_eq!(C::MAGENTA[1], 0);
    assert_eq!(format!("{:?}", C::RED), "#ff0000ff");
}

#[test]
fn draw_dot() {
    let mut image = Image::filled(Resolution::new(21, 21), C::BLACK);
    draw::dot(&mut image, 10.0, 10.0).radius(3.0).color(C::GREEN);
    assert_eq!(image.get(10, 10), C::GREEN);
    assert_eq!(image.get(0, 0), C::BLACK);
    assert_eq!(image.get(20, 20), C::BLACK);
}

#[test]
fn draw_clips_to_image() {
    let mut image = Image::filled(Resolution::new(8, 8), C::BLACK);
    // Mostly out of bounds; must not panic.
    draw::dot(&mut image, -3.0, -3.0).radius(5.0);
    draw::line(&mut image, [-10.0, 4.0], [20.0, 4.0]).color(C::WHITE);
    assert_eq!(image.get(0, 4), C::WHITE);
    assert_eq!(image.get(7, 4), C::WHITE);
}

#[test]
fn draw_triangle_and_rect() {
    let mut image = Image::filled(Resolution::new(10, 10), C::BLACK);
    draw::triangle(&mut image, [[0.0, 0.0], [9.0, 0.0], [0.0, 9.0]]).color(C::RED);
    assert_eq!(image.get(1, 1), C::RED);
    assert_eq!(image.get(9, 9), C::BLACK);

    let mut image = Image::filled(Resolution::new(10, 10), C::BLACK);
    draw::rect(&mut image, Rect::from_top_left(2.0, 2.0, 4.0, 4.0))
        .color(C::BLUE)
        .filled();
    assert_eq!(image.get(3, 3), C::BLUE);
    assert_eq!(image.get(8, 8), C::BLACK);
}
