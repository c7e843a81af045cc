//! 内联图片（`BI ... ID <data> EI`）
//!
//! lopdf 的内容解析器读不了内联图片的二进制数据，
//! 所以先从原始流中切出图片，每张图片替换为一个 `<n> BI` 占位操作。
//! 脱敏完成后再把占位符展开回真正的内联图片。

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, Stream};

use crate::error::{PdfError, Result};

/// 一张内联图片，字典键名和滤镜名均已展开为全称
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InlineImage {
    pub dict: Dictionary,
    pub data: Vec<u8>,
}

impl InlineImage {
    /// 把修改后的图片流转回内联形式
    pub fn from_stream(stream: Stream) -> Self {
        let mut dict = stream.dict;
        for key in [b"Length".as_slice(), b"Type".as_slice(), b"Subtype".as_slice()] {
            dict.remove(key);
        }
        Self {
            dict,
            data: stream.content,
        }
    }

    pub fn to_stream(&self) -> Stream {
        let mut dict = self.dict.clone();
        dict.set("Subtype", "Image");
        Stream::new(dict, self.data.clone())
    }
}

fn is_delimiter(byte: u8) -> bool {
    b"()<>[]{}/%".contains(&byte)
}

fn is_regular(byte: u8) -> bool {
    !byte.is_ascii_whitespace() && !is_delimiter(byte)
}

/// 从 `start` 开始的字面字符串的结束位置
fn skip_literal(data: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < data.len() {
        match data[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    data.len()
}

/// `i` 处下一个语法单元的范围，以及它是否为裸关键字
fn next_unit(data: &[u8], i: usize) -> (usize, bool) {
    match data[i] {
        b'(' => (skip_literal(data, i), false),
        b'%' => {
            let mut j = i;
            while j < data.len() && data[j] != b'\n' && data[j] != b'\r' {
                j += 1;
            }
            (j, false)
        }
        b'<' if data.get(i + 1) == Some(&b'<') => (i + 2, false),
        b'<' => {
            let end = data[i..].iter().position(|b| *b == b'>').map(|p| i + p + 1);
            (end.unwrap_or(data.len()), false)
        }
        b'/' => {
            let mut j = i + 1;
            while j < data.len() && is_regular(data[j]) {
                j += 1;
            }
            (j, false)
        }
        byte if is_regular(byte) => {
            let mut j = i;
            while j < data.len() && is_regular(data[j]) {
                j += 1;
            }
            (j, true)
        }
        _ => (i + 1, false),
    }
}

fn expand_key(key: &[u8]) -> &[u8] {
    match key {
        b"BPC" => b"BitsPerComponent",
        b"CS" => b"ColorSpace",
        b"D" => b"Decode",
        b"DP" => b"DecodeParms",
        b"F" => b"Filter",
        b"H" => b"Height",
        b"IM" => b"ImageMask",
        b"I" => b"Interpolate",
        b"L" => b"Length",
        b"W" => b"Width",
        other => other,
    }
}

fn expand_name(key: &[u8], name: &[u8]) -> Vec<u8> {
    let full: &[u8] = match (key, name) {
        (b"Filter", b"AHx") => b"ASCIIHexDecode",
        (b"Filter", b"A85") => b"ASCII85Decode",
        (b"Filter", b"LZW") => b"LZWDecode",
        (b"Filter", b"Fl") => b"FlateDecode",
        (b"Filter", b"RL") => b"RunLengthDecode",
        (b"Filter", b"CCF") => b"CCITTFaxDecode",
        (b"Filter", b"DCT") => b"DCTDecode",
        (b"ColorSpace", b"G") => b"DeviceGray",
        (b"ColorSpace", b"RGB") => b"DeviceRGB",
        (b"ColorSpace", b"CMYK") => b"DeviceCMYK",
        (b"ColorSpace", b"I") => b"Indexed",
        _ => name,
    };
    full.to_vec()
}

fn expand_value(key: &[u8], value: Object) -> Object {
    match value {
        Object::Name(name) => Object::Name(expand_name(key, &name)),
        Object::Array(items) => Object::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Object::Name(name) => Object::Name(expand_name(key, &name)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

/// 解析 `BI` 与 `ID` 之间的键值对
fn parse_header(header: &[u8]) -> Option<Dictionary> {
    let mut source = header.to_vec();
    source.extend_from_slice(b" ID");
    let content = Content::decode(&source).ok()?;
    let op = content.operations.into_iter().find(|op| op.operator == "ID")?;

    let mut dict = Dictionary::new();
    let mut operands = op.operands.into_iter();
    while let (Some(key), Some(value)) = (operands.next(), operands.next()) {
        let key = match key {
            Object::Name(name) => expand_key(&name).to_vec(),
            _ => return None,
        };
        let value = expand_value(&key, value);
        dict.set(key, value);
    }
    Some(dict)
}

/// 在从 `start` 开始的数据之后查找 `EI`：前面必须是空白，
/// 后面是空白、分隔符或数据结尾。返回数据结束位置和 `EI` 之后的位置。
fn find_end(data: &[u8], start: usize, length: Option<usize>) -> Option<(usize, usize)> {
    let closes = |at: usize| {
        at >= 1
            && at + 2 <= data.len()
            && data[at - 1].is_ascii_whitespace()
            && data.get(at..at + 2) == Some(&b"EI"[..])
            && data.get(at + 2).map_or(true, |b| !is_regular(*b))
    };

    if let Some(length) = length {
        let mut at = start + length;
        while at < data.len() && data[at].is_ascii_whitespace() {
            at += 1;
        }
        if closes(at) {
            return Some((start + length, at + 2));
        }
    }

    (start + 1..data.len().saturating_sub(1))
        .find(|at| closes(*at))
        .map(|at| (at - 1, at + 2))
}

/// 切出一张 `BI` 结束于 `start` 的图片，返回图片和 `EI` 之后的偏移
fn cut_image(data: &[u8], start: usize) -> Option<(InlineImage, usize)> {
    let mut i = start;
    let id_start = loop {
        if i >= data.len() {
            return None;
        }
        let (end, keyword) = next_unit(data, i);
        if keyword && &data[i..end] == b"ID" {
            break i;
        }
        if keyword && &data[i..end] == b"EI" {
            return None;
        }
        i = end;
    };

    let dict = parse_header(&data[start..id_start])?;
    // ID 与数据之间恰好隔一个空白字节
    let payload = id_start + 3;
    if payload > data.len() {
        return None;
    }
    let length = dict
        .get(b"Length")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .and_then(|v| usize::try_from(v).ok());
    let (payload_end, end) = find_end(data, payload, length)?;

    let mut dict = dict;
    dict.remove(b"Length");
    Some((
        InlineImage {
            dict,
            data: data[payload..payload_end].to_vec(),
        },
        end,
    ))
}

/// 把 `data` 中每张内联图片替换为 `<n> BI` 占位符，
/// `n` 为返回图片列表中的下标
pub(crate) fn extract(data: &[u8]) -> (Vec<u8>, Vec<InlineImage>) {
    let mut out = Vec::with_capacity(data.len());
    let mut images = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let (end, keyword) = next_unit(data, i);
        if keyword && &data[i..end] == b"BI" {
            if let Some((image, after)) = cut_image(data, end) {
                out.extend_from_slice(format!("{} BI", images.len()).as_bytes());
                images.push(image);
                i = after;
                continue;
            }
            log::warn!("[Redact] 第 {} 字节处的内联图片没有结束标记", i);
        }
        out.extend_from_slice(&data[i..end]);
        i = end;
    }

    (out, images)
}

/// 占位操作对应的图片下标
pub(crate) fn placeholder(op: &Operation) -> Option<usize> {
    if op.operator != "BI" {
        return None;
    }
    match op.operands.as_slice() {
        [Object::Integer(n)] => usize::try_from(*n).ok(),
        _ => None,
    }
}

fn encode_operations(operations: Vec<Operation>) -> Result<Vec<u8>> {
    Content { operations }
        .encode()
        .map_err(|e| PdfError::Content(e.to_string()))
}

/// 序列化 `operations`，每个占位符写成对应的内联图片
pub(crate) fn encode(operations: Vec<Operation>, images: &[InlineImage]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut pending = Vec::new();

    for op in operations {
        let image = match placeholder(&op).and_then(|n| images.get(n)) {
            Some(image) => image,
            None => {
                pending.push(op);
                continue;
            }
        };

        if !pending.is_empty() {
            out.extend(encode_operations(std::mem::take(&mut pending))?);
            out.push(b'\n');
        }
        let operands = image
            .dict
            .iter()
            .flat_map(|(key, value)| [Object::Name(key.clone()), value.clone()])
            .collect();
        out.extend_from_slice(b"BI ");
        out.extend(encode_operations(vec![Operation::new("ID", operands)])?);
        out.push(b' ');
        out.extend_from_slice(&image.data);
        out.extend_from_slice(b"\nEI\n");
    }

    if !pending.is_empty() {
        out.extend(encode_operations(pending)?);
    }
    Ok(out)
}
