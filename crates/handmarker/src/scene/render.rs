//! Software rasterizer for [`Scene`]s.

use handmarker_image::{draw, Color, Image};
use nalgebra::{Point3, Vector3};

use super::{Material, PerspectiveCamera, Scene, TestCube};

/// Cube faces as outward normal and the indices of their corners (see [`cube_corner`]), in order
/// around the face.
const CUBE_FACES: [([f32; 3], [usize; 4]); 6] = [
    ([1.0, 0.0, 0.0], [1, 3, 7, 5]),
    ([-1.0, 0.0, 0.0], [0, 4, 6, 2]),
    ([0.0, 1.0, 0.0], [2, 6, 7, 3]),
    ([0.0, -1.0, 0.0], [0, 1, 5, 4]),
    ([0.0, 0.0, 1.0], [4, 5, 7, 6]),
    ([0.0, 0.0, -1.0], [0, 2, 3, 1]),
];

/// Corner `i` of a cube: bit 0 selects +X, bit 1 +Y, bit 2 +Z.
fn cube_corner(cube: &TestCube, i: usize) -> Point3<f32> {
    let h = cube.size / 2.0;
    let offset = |bit: usize| if i & bit != 0 { h } else { -h };
    cube.center + Vector3::new(offset(1), offset(2), offset(4))
}

enum Drawable {
    Face {
        corners: [Point3<f32>; 4],
        color: Color,
    },
    Marker,
}

/// Renders `scene` as seen by `camera` on top of the existing contents of `target`.
///
/// Objects are painted back to front. Objects behind the camera's near plane are skipped.
pub fn render(scene: &Scene, camera: &PerspectiveCamera, target: &mut Image) {
    let mut drawables = Vec::new();

    if let Some(cube) = &scene.test_cube {
        for (normal, corners) in CUBE_FACES {
            let corners = corners.map(|i| cube_corner(cube, i));
            let normal = Vector3::from(normal);
            let to_camera = camera.position() - corners[0];
            if normal.dot(&to_camera) <= 0.0 {
                // Back face.
                continue;
            }
            let center = corners
                .iter()
                .fold(Vector3::zeros(), |acc, c| acc + c.coords)
                / 4.0;
            let depth = -camera.to_view(&Point3::from(center)).z;
            drawables.push((
                depth,
                Drawable::Face {
                    corners,
                    color: cube.color,
                },
            ));
        }
    }

    let marker_depth = -camera.to_view(&scene.marker.position()).z;
    drawables.push((marker_depth, Drawable::Marker));

    drawables.sort_by(|(a, _), (b, _)| b.total_cmp(a));

    for (_, drawable) in drawables {
        match drawable {
            Drawable::Face { corners, color } => draw_face(camera, &corners, color, target),
            Drawable::Marker => draw_marker(scene, camera, target),
        }
    }
}

fn draw_face(
    camera: &PerspectiveCamera,
    corners: &[Point3<f32>; 4],
    color: Color,
    target: &mut Image,
) {
    let res = target.resolution();
    let mut projected = [[0.0; 2]; 4];
    for (out, corner) in projected.iter_mut().zip(corners) {
        let Some(p) = camera.project(corner, res) else {
            return;
        };
        *out = [p.x, p.y];
    }

    let [a, b, c, d] = projected;
    draw::triangle(target, [a, b, c]).color(color);
    draw::triangle(target, [a, c, d]).color(color);
}

fn draw_marker(scene: &Scene, camera: &PerspectiveCamera, target: &mut Image) {
    let marker = &scene.marker;
    let res = target.resolution();
    let view_center = camera.to_view(&marker.position());
    let depth = -view_center.z;
    let Some(center) = camera.project_view(&view_center, res) else {
        return;
    };
    if depth - marker.radius() < camera.near() {
        return;
    }

    let radius_px = marker.radius() * camera.focal_length_px(res.height()) / depth;
    if radius_px <= 0.0 {
        return;
    }

    let light_dir = (camera.to_view(&scene.point_light.position) - view_center).normalize();

    let x_min = (center.x - radius_px).floor().max(0.0) as u32;
    let y_min = (center.y - radius_px).floor().max(0.0) as u32;
    let x_max = (center.x + radius_px).ceil().min(res.width() as f32);
    let y_max = (center.y + radius_px).ceil().min(res.height() as f32);
    if x_max <= 0.0 || y_max <= 0.0 {
        return;
    }

    for y in y_min..y_max as u32 {
        for x in x_min..x_max as u32 {
            let dx = (x as f32 + 0.5 - center.x) / radius_px;
            let dy = (y as f32 + 0.5 - center.y) / radius_px;
            let d2 = dx * dx + dy * dy;
            if d2 > 1.0 {
                continue;
            }

            let color = match marker.material() {
                Material::Basic => marker.color(),
                Material::Lambert => {
                    // Sphere surface normal in view space. Screen Y points down.
                    let normal = Vector3::new(dx, -dy, (1.0 - d2).sqrt());
                    shade_lambert(scene, marker.color(), normal.dot(&light_dir))
                }
            };
            target.set(x, y, color);
        }
    }
}

fn shade_lambert(scene: &Scene, base: Color, n_dot_l: f32) -> Color {
    let ambient = scene.ambient;
    let point = scene.point_light;
    let diffuse = n_dot_l.max(0.0) * point.intensity;
    let channel = |c: usize| {
        let light = ambient.intensity * ambient.color[c] as f32 / 255.0
            + diffuse * point.color[c] as f32 / 255.0;
        (base[c] as f32 * light).round().clamp(0.0, 255.0) as u8
    };
    Color::from_rgba8(channel(0), channel(1), channel(2), base.a())
}

#[cfg(test)]
mod tests {
    use handmarker_image::Resolution;

    use super::*;
    use crate::scene::Marker;

    fn setup(material: Material) -> (Scene, PerspectiveCamera, Image) {
        let scene = Scene::new(Marker::new(1.0, Color::MAGENTA, material));
        let camera = PerspectiveCamera::new(75.0, Point3::new(0.0, 0.0, 10.0));
        let image = Image::filled(Resolution::RES_VGA, Color::BLACK);
        (scene, camera, image)
    }

    #[test]
    fn marker_at_origin_covers_center() {
        let (scene, camera, mut image) = setup(Material::Basic);
        render(&scene, &camera, &mut image);
        assert_eq!(image.get(320, 240), Color::MAGENTA);
        assert_eq!(image.get(0, 0), Color::BLACK);
        assert_eq!(image.get(639, 479), Color::BLACK);
    }

    #[test]
    fn marker_size_follows_perspective() {
        let (mut scene, camera, mut near) = setup(Material::Basic);
        let count = |image: &Image| {
            (0..image.height())
                .flat_map(|y| (0..image.width()).map(move |x| (x, y)))
                .filter(|&(x, y)| image.get(x, y) == Color::MAGENTA)
                .count()
        };

        *scene.marker.position_mut() = Point3::new(0.0, 0.0, 5.0);
        render(&scene, &camera, &mut near);

        let mut far = Image::filled(Resolution::RES_VGA, Color::BLACK);
        *scene.marker.position_mut() = Point3::new(0.0, 0.0, -10.0);
        render(&scene, &camera, &mut far);

        assert!(count(&near) > 2 * count(&far));
        assert!(count(&far) > 0);
    }

    #[test]
    fn marker_behind_camera_draws_nothing() {
        let (mut scene, camera, mut image) = setup(Material::Basic);
        *scene.marker.position_mut() = Point3::new(0.0, 0.0, 15.0);
        render(&scene, &camera, &mut image);

        let untouched = Image::filled(Resolution::RES_VGA, Color::BLACK);
        assert_eq!(image.data(), untouched.data());
    }

    #[test]
    fn lambert_is_lit_from_the_light() {
        let (scene, camera, mut image) = setup(Material::Lambert);
        render(&scene, &camera, &mut image);

        // The light is at the top right, so the top right of the sphere is brighter.
        let radius_px = camera.focal_length_px(480) / 10.0;
        let offset = (radius_px * 0.5) as u32;
        let lit = image.get(320 + offset, 240 - offset);
        let shadow = image.get(320 - offset, 240 + offset);
        assert!(lit.r() > shadow.r(), "{lit:?} vs {shadow:?}");
        // Ambient light keeps the unlit side visible.
        assert!(shadow.r() > 0);
        assert_eq!(shadow.g(), 0);
    }

    #[test]
    fn test_cube_is_drawn_behind_marker() {
        let (mut scene, camera, mut image) = setup(Material::Basic);
        scene.test_cube = Some(TestCube::default());
        *scene.marker.position_mut() = Point3::new(0.0, 0.0, 1.0);
        render(&scene, &camera, &mut image);
        assert_eq!(image.get(320, 240), Color::MAGENTA);

        // Move the marker out of the way; the cube's front face is now visible.
        let mut image = Image::filled(Resolution::RES_VGA, Color::BLACK);
        *scene.marker.position_mut() = Point3::new(-4.0, 0.0, 0.0);
        render(&scene, &camera, &mut image);
        assert_eq!(image.get(320, 240), Color::GREEN);
    }
}
