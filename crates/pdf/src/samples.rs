//! 像素脱敏所需的图片采样解码与重新编码
//!
//! 可解码的图片：经任意 Flate、LZW、ASCII85、ASCIIHex、RunLength 滤镜链的
//! 1、2、4、8、16 位采样，CCITT 传真数据（Group 3 一维与 Group 4）和 JPEG，
//! 色彩空间支持 Gray、RGB、CMYK、ICC 与 Indexed，另外还有模板蒙版。
//! 修改后的图片写回为 8 位 Gray 或 RGB（JPEG 仍为 JPEG，蒙版仍为 1 位蒙版）。
//! JBIG2 和 JPEG 2000 数据无法解码。

use std::io::Cursor;

use fax::decoder::{decode_g3, decode_g4, pels};
use fax::Color;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};

use crate::error::{PdfError, Result};
use crate::ops::number;
use crate::page::resolve;

const MAX_SPACE_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
enum Space {
    Gray,
    Rgb,
    Cmyk,
    Indexed {
        base: Box<Space>,
        hival: usize,
        lookup: Vec<u8>,
    },
}

impl Space {
    fn components(&self) -> usize {
        match self {
            Space::Gray | Space::Indexed { .. } => 1,
            Space::Rgb => 3,
            Space::Cmyk => 4,
        }
    }

    fn is_gray(&self) -> bool {
        match self {
            Space::Gray => true,
            Space::Indexed { base, .. } => base.is_gray(),
            _ => false,
        }
    }
}

/// 修改后的图片如何写回文件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Jpeg,
    Samples,
    /// 模板蒙版：黑色像素绘制，白色不绘制
    Mask,
}

#[derive(Debug)]
pub(crate) struct Decoded {
    /// `ImageLuma8` 或 `ImageRgb8`
    pub image: DynamicImage,
    pub kind: Kind,
}

fn stream_data(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

fn parse_space(doc: &Document, obj: &Object, named: Option<&Dictionary>, depth: usize) -> Option<Space> {
    if depth > MAX_SPACE_DEPTH {
        return None;
    }
    match resolve(doc, obj)? {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Some(Space::Gray),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(Space::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(Space::Cmyk),
            other => parse_space(doc, named?.get(other).ok()?, named, depth + 1),
        },
        Object::Array(arr) => {
            let family = arr.first()?.as_name().ok()?;
            match family {
                b"CalGray" => Some(Space::Gray),
                b"CalRGB" => Some(Space::Rgb),
                b"ICCBased" => {
                    let profile = match resolve(doc, arr.get(1)?)? {
                        Object::Stream(profile) => profile,
                        _ => return None,
                    };
                    match profile.dict.get(b"N").ok().and_then(|n| n.as_i64().ok()) {
                        Some(1) => Some(Space::Gray),
                        Some(3) => Some(Space::Rgb),
                        Some(4) => Some(Space::Cmyk),
                        _ => parse_space(doc, profile.dict.get(b"Alternate").ok()?, named, depth + 1),
                    }
                }
                b"Indexed" | b"I" => {
                    let base = parse_space(doc, arr.get(1)?, named, depth + 1)?;
                    if matches!(base, Space::Indexed { .. }) {
                        return None;
                    }
                    let hival = usize::try_from(arr.get(2)?.as_i64().ok()?).ok()?;
                    let lookup = match resolve(doc, arr.get(3)?)? {
                        Object::String(bytes, _) => bytes.clone(),
                        Object::Stream(stream) => stream_data(stream),
                        _ => return None,
                    };
                    if lookup.len() < (hival + 1) * base.components() {
                        return None;
                    }
                    Some(Space::Indexed {
                        base: Box::new(base),
                        hival,
                        lookup,
                    })
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

fn filter_params(doc: &Document, dict: &Dictionary, count: usize) -> Vec<Option<Dictionary>> {
    let as_dict = |obj: &Object| match resolve(doc, obj) {
        Some(Object::Dictionary(d)) => Some(d.clone()),
        _ => None,
    };
    match dict.get(b"DecodeParms") {
        Ok(Object::Array(arr)) => (0..count).map(|i| arr.get(i).and_then(as_dict)).collect(),
        Ok(obj) => {
            let mut params = vec![None; count];
            if let Some(first) = params.first_mut() {
                *first = as_dict(obj);
            }
            params
        }
        Err(_) => vec![None; count],
    }
}

fn ascii_hex(data: &[u8]) -> Vec<u8> {
    let mut digits = Vec::with_capacity(data.len());
    for byte in data {
        if *byte == b'>' {
            break;
        }
        let value = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => continue,
        };
        digits.push(value);
    }
    if digits.len() % 2 == 1 {
        digits.push(0);
    }
    digits.chunks(2).map(|p| (p[0] << 4) | p[1]).collect()
}

fn run_length(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0;
    while i < data.len() {
        let length = data[i] as usize;
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let end = (i + length + 1).min(data.len());
                out.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                if let Some(byte) = data.get(i) {
                    out.extend(std::iter::repeat(*byte).take(257 - length));
                }
                i += 1;
            }
        }
    }
    out
}

/// 还原一个通用滤镜
fn unfilter(name: &[u8], data: Vec<u8>, params: Option<Dictionary>) -> Option<Vec<u8>> {
    match name {
        b"ASCIIHexDecode" => Some(ascii_hex(&data)),
        b"RunLengthDecode" => Some(run_length(&data)),
        b"FlateDecode" | b"LZWDecode" | b"ASCII85Decode" => {
            let mut dict = Dictionary::new();
            dict.set("Filter", Object::Name(name.to_vec()));
            if let Some(params) = params {
                dict.set("DecodeParms", Object::Dictionary(params));
            }
            Stream::new(dict, data).decompressed_content().ok()
        }
        _ => None,
    }
}

fn int_param(params: Option<&Dictionary>, key: &[u8]) -> Option<i64> {
    params?.get(key).ok()?.as_i64().ok()
}

/// 把 CCITT 传真数据解码为按位打包的行，置位表示白色；
/// `BlackIs1` 为 true 时置位表示黑色
fn decode_ccitt(data: &[u8], params: Option<&Dictionary>, width: u32, height: u32) -> Option<Vec<u8>> {
    let k = int_param(params, b"K").unwrap_or(0);
    let black_is_1 = matches!(params.and_then(|p| p.get(b"BlackIs1").ok()), Some(Object::Boolean(true)));
    let columns = u16::try_from(width).ok()?;
    let rows = u16::try_from(height).ok()?;

    let row_bytes = (width as usize + 7) / 8;
    let mut out = Vec::with_capacity(row_bytes * height as usize);
    let mut lines = 0u32;
    let mut push_line = |transitions: &[u16]| {
        if lines >= height {
            return;
        }
        let mut row = vec![0u8; row_bytes];
        for (x, color) in pels(transitions, columns).enumerate() {
            if (color == Color::Black) == black_is_1 {
                row[x / 8] |= 0x80 >> (x % 8);
            }
        }
        out.extend_from_slice(&row);
        lines += 1;
    };

    match k {
        k if k < 0 => {
            decode_g4(data.iter().copied(), columns, Some(rows), &mut push_line);
        }
        0 => {
            decode_g3(data.iter().copied(), &mut push_line);
        }
        _ => {
            log::debug!("[Redact] 不支持一维/二维混合的 CCITT 数据 (K={})", k);
            return None;
        }
    }
    if lines == 0 {
        return None;
    }

    // 数据不足：用白色行补齐
    let white = if black_is_1 { 0x00 } else { 0xFF };
    out.resize(row_bytes * height as usize, white);
    Some(out)
}

fn decode_ranges(dict: &Dictionary, defaults: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    let values: Vec<f64> = match dict.get(b"Decode") {
        Ok(Object::Array(arr)) => arr.iter().filter_map(number).collect(),
        _ => return defaults,
    };
    if values.len() != defaults.len() * 2 {
        return defaults;
    }
    values.chunks(2).map(|pair| (pair[0], pair[1])).collect()
}

fn unit_to_byte(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn cmyk_to_rgb(c: f64, m: f64, y: f64, k: f64) -> [u8; 3] {
    let k = 1.0 - k.clamp(0.0, 1.0);
    [
        unit_to_byte((1.0 - c) * k),
        unit_to_byte((1.0 - m) * k),
        unit_to_byte((1.0 - y) * k),
    ]
}

/// 读取按 `bits` 位打包的行中第 `index` 个采样
fn sample(row: &[u8], index: usize, bits: usize) -> u32 {
    match bits {
        8 => row[index] as u32,
        16 => u16::from_be_bytes([row[index * 2], row[index * 2 + 1]]) as u32,
        _ => {
            let bit = index * bits;
            let byte = row[bit / 8];
            let shift = 8 - bits - (bit % 8);
            ((byte >> shift) as u32) & ((1 << bits) - 1)
        }
    }
}

/// 原始采样转换为 8 位 Gray 或 RGB 图片
fn samples_to_image(
    data: &[u8],
    width: u32,
    height: u32,
    bits: usize,
    space: &Space,
    dict: &Dictionary,
) -> Option<DynamicImage> {
    if ![1, 2, 4, 8, 16].contains(&bits) {
        return None;
    }
    let n = space.components();
    let (w, h) = (width as usize, height as usize);
    let row_bytes = (w * n * bits + 7) / 8;
    if data.len() < row_bytes * h {
        return None;
    }

    let max = ((1u32 << bits) - 1) as f64;
    let defaults = match space {
        Space::Indexed { .. } => vec![(0.0, max)],
        _ => vec![(0.0, 1.0); n],
    };
    let ranges = decode_ranges(dict, defaults);
    let mapped = |row: &[u8], x: usize, c: usize| {
        let (lo, hi) = ranges[c];
        lo + sample(row, x * n + c, bits) as f64 * (hi - lo) / max
    };

    let gray = space.is_gray();
    let mut out = Vec::with_capacity(w * h * if gray { 1 } else { 3 });
    for y in 0..h {
        let row = &data[y * row_bytes..(y + 1) * row_bytes];
        for x in 0..w {
            match space {
                Space::Gray => out.push(unit_to_byte(mapped(row, x, 0))),
                Space::Rgb => (0..3).for_each(|c| out.push(unit_to_byte(mapped(row, x, c)))),
                Space::Cmyk => out.extend(cmyk_to_rgb(
                    mapped(row, x, 0),
                    mapped(row, x, 1),
                    mapped(row, x, 2),
                    mapped(row, x, 3),
                )),
                Space::Indexed { base, hival, lookup } => {
                    let index = (mapped(row, x, 0).round().max(0.0) as usize).min(*hival);
                    let entry = &lookup[index * base.components()..(index + 1) * base.components()];
                    match base.as_ref() {
                        Space::Cmyk => {
                            let unit = |b: u8| b as f64 / 255.0;
                            out.extend(cmyk_to_rgb(unit(entry[0]), unit(entry[1]), unit(entry[2]), unit(entry[3])));
                        }
                        _ => out.extend_from_slice(entry),
                    }
                }
            }
        }
    }

    if gray {
        GrayImage::from_raw(width, height, out).map(DynamicImage::ImageLuma8)
    } else {
        RgbImage::from_raw(width, height, out).map(DynamicImage::ImageRgb8)
    }
}

/// 1 位模板转为灰度：蒙版绘制处为 0，其余为 255
fn mask_to_image(data: &[u8], width: u32, height: u32, dict: &Dictionary) -> Option<DynamicImage> {
    let (w, h) = (width as usize, height as usize);
    let row_bytes = (w + 7) / 8;
    if data.len() < row_bytes * h {
        return None;
    }
    let (lo, hi) = decode_ranges(dict, vec![(0.0, 1.0)])[0];
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        let row = &data[y * row_bytes..(y + 1) * row_bytes];
        for x in 0..w {
            let value = lo + sample(row, x, 1) as f64 * (hi - lo);
            out.push(if value < 0.5 { 0 } else { 255 });
        }
    }
    GrayImage::from_raw(width, height, out).map(DynamicImage::ImageLuma8)
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    dict.get(key)
        .ok()?
        .as_i64()
        .ok()
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
}

pub(crate) fn image_size(dict: &Dictionary) -> Option<(u32, u32)> {
    Some((dimension(dict, b"Width")?, dimension(dict, b"Height")?))
}

/// 根据图片字典和原始（仍带滤镜的）数据解码图片。
/// `named` 为内联图片可能引用的 `ColorSpace` 资源
pub(crate) fn decode(
    doc: &Document,
    dict: &Dictionary,
    content: &[u8],
    named: Option<&Dictionary>,
) -> Option<Decoded> {
    let (width, height) = image_size(dict)?;
    let is_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));

    let filters = filter_names(dict);
    let params = filter_params(doc, dict, filters.len());
    let mut data = content.to_vec();
    let mut terminal = None;
    for (i, (name, params)) in filters.iter().zip(params).enumerate() {
        match name.as_slice() {
            b"DCTDecode" | b"CCITTFaxDecode" | b"JBIG2Decode" | b"JPXDecode" => {
                if i + 1 != filters.len() {
                    return None;
                }
                terminal = Some((name.clone(), params));
            }
            other => data = unfilter(other, data, params)?,
        }
    }

    let mut bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(if is_mask { 1 } else { 8 });

    match terminal {
        Some((name, _)) if name == b"DCTDecode" => {
            if is_mask {
                return None;
            }
            let space = dict.get(b"ColorSpace").ok().and_then(|cs| parse_space(doc, cs, named, 0));
            let img = image::load_from_memory_with_format(&data, ImageFormat::Jpeg).ok()?;
            let gray = match space {
                Some(space) => space.is_gray(),
                None => img.color().channel_count() == 1,
            };
            let image = if gray {
                DynamicImage::ImageLuma8(img.to_luma8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            return Some(Decoded {
                image,
                kind: Kind::Jpeg,
            });
        }
        Some((name, params)) if name == b"CCITTFaxDecode" => {
            data = decode_ccitt(&data, params.as_ref(), width, height)?;
            bits = 1;
        }
        Some((name, _)) => {
            log::debug!(
                "[Redact] 没有 {} 图片数据的解码器",
                String::from_utf8_lossy(&name)
            );
            return None;
        }
        None => {}
    }

    if is_mask {
        return mask_to_image(&data, width, height, dict).map(|image| Decoded {
            image,
            kind: Kind::Mask,
        });
    }

    let space = match dict.get(b"ColorSpace") {
        Ok(cs) => parse_space(doc, cs, named, 0)?,
        // 没有色彩空间的 CCITT 数据按灰度处理
        Err(_) if bits == 1 => Space::Gray,
        Err(_) => return None,
    };
    samples_to_image(&data, width, height, bits, &space, dict).map(|image| Decoded {
        image,
        kind: Kind::Samples,
    })
}

fn pack_mask(gray: &GrayImage) -> Vec<u8> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let row_bytes = (w + 7) / 8;
    let mut out = vec![0u8; row_bytes * h];
    for (x, y, pixel) in gray.enumerate_pixels() {
        // 默认 Decode [0 1] 下置位不绘制
        if pixel[0] >= 128 {
            out[y as usize * row_bytes + x as usize / 8] |= 0x80 >> (x % 8);
        }
    }
    out
}

/// 为修改后的图片构建替换用的流
pub(crate) fn encode(original: &Dictionary, decoded: Decoded) -> Result<Stream> {
    let mut dict = original.clone();
    for key in [
        b"DecodeParms".as_slice(),
        b"Decode".as_slice(),
        b"Filter".as_slice(),
        b"Length".as_slice(),
    ] {
        dict.remove(key);
    }
    // 颜色键蒙版按原始采样值比较，重新编码后不再适用
    if matches!(dict.get(b"Mask"), Ok(Object::Array(_))) {
        dict.remove(b"Mask");
    }

    let gray = matches!(decoded.image, DynamicImage::ImageLuma8(_));
    let (data, compress) = match decoded.kind {
        Kind::Mask => {
            dict.remove(b"ColorSpace");
            dict.set("BitsPerComponent", 1);
            (pack_mask(&decoded.image.to_luma8()), true)
        }
        Kind::Jpeg => {
            let mut data = Vec::new();
            decoded
                .image
                .write_to(&mut Cursor::new(&mut data), ImageFormat::Jpeg)
                .map_err(|e| PdfError::Image(e.to_string()))?;
            dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
            (data, false)
        }
        Kind::Samples => (decoded.image.into_bytes(), true),
    };
    if decoded.kind != Kind::Mask {
        dict.set("ColorSpace", if gray { "DeviceGray" } else { "DeviceRGB" });
        dict.set("BitsPerComponent", 8);
    }

    let mut stream = Stream::new(dict, data);
    if compress {
        if let Err(e) = stream.compress() {
            log::debug!("[Redact] 图片流未压缩: {}", e);
        }
    }
    Ok(stream)
}
