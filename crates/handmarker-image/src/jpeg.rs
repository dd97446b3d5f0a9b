use anyhow::bail;
use image::{ImageBuffer, Rgba};
use jpeg_decoder::{Decoder, PixelFormat};

use crate::Image;

pub(crate) fn decode_jpeg(data: &[u8]) -> anyhow::Result<Image> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder.decode()?;
    let Some(info) = decoder.info() else {
        bail!("JPEG decoder returned no image information");
    };
    let (width, height) = (u32::from(info.width), u32::from(info.height));

    let rgba = match info.pixel_format {
        PixelFormat::RGB24 => pixels
            .chunks_exact(3)
            .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
            .collect::<Vec<_>>(),
        PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l, 255]).collect(),
        PixelFormat::L16 => pixels
            .chunks_exact(2)
            .flat_map(|l| [l[0], l[0], l[0], 255])
            .collect(),
        PixelFormat::CMYK32 => pixels
            .chunks_exact(4)
            .flat_map(|cmyk| {
                // Adobe-style inverted CMYK, as produced by libjpeg.
                let k = u16::from(cmyk[3]);
                let conv = |c: u8| ((u16::from(c) * k) / 255) as u8;
                [conv(cmyk[0]), conv(cmyk[1]), conv(cmyk[2]), 255]
            })
            .collect(),
    };

    let Some(buf) = ImageBuffer::<Rgba<u8>, _>::from_vec(width, height, rgba) else {
        bail!("decoded JPEG data does not match its {width}x{height} header");
    };
    Ok(Image { buf })
}
