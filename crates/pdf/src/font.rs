//! 用于计算字形框的字体度量：几个字节构成一个字符编码，
//! 以及每个编码前进多少。
//!
//! 从不解析字体程序。宽度来自 `/Widths`（简单字体）或 `/W` 与 `/DW`（CID 字体）；
//! 都没有时按字号估算。

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, Stream};

use crate::ops::number;
use crate::page::{resolve, resolve_dict};

/// 字体编码在某个字节长度下接受的编码范围
#[derive(Debug, Clone, PartialEq)]
struct CodeRange {
    low: Vec<u8>,
    high: Vec<u8>,
}

impl CodeRange {
    fn new(low: &[u8], high: &[u8]) -> Self {
        Self {
            low: low.to_vec(),
            high: high.to_vec(),
        }
    }

    fn len(&self) -> usize {
        self.low.len()
    }

    fn contains(&self, bytes: &[u8]) -> bool {
        bytes.len() == self.len()
            && bytes
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(b, (lo, hi))| lo <= b && b <= hi)
    }
}

/// CID 字体的 `编码 -> CID` 映射
#[derive(Debug, Clone, PartialEq)]
enum CidMap {
    Identity,
    /// 来自内嵌 CMap 的 `(起始编码, 结束编码, 起始 CID)`
    Ranges(Vec<(u32, u32, u32)>),
    /// 未内置映射的预定义 CMap；宽度退回 `DW`
    Unknown,
}

#[derive(Debug, Clone)]
enum Widths {
    /// 没有可用度量：单字节 ASCII 为 0.55 em，其余为 1 em
    Estimated,
    Simple {
        first_char: u32,
        /// 已换算为单位字号下的文字空间宽度
        widths: Vec<f64>,
        missing: Option<f64>,
    },
    Cid {
        map: CidMap,
        /// `(起始 CID, 结束 CID, 宽度)`，换算方式同 `Simple::widths`
        widths: Vec<(u32, u32, f64)>,
        default: f64,
    },
}

/// 单个字体资源的编码切分与宽度
#[derive(Debug, Clone)]
pub(crate) struct FontMetrics {
    /// 单字节字体为空
    codespace: Vec<CodeRange>,
    widths: Widths,
}

/// 显示字符串中的一个字符编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Code {
    pub value: u32,
    pub len: usize,
}

impl Code {
    /// 字间距只作用于单字节编码 32
    pub fn is_word_space(&self) -> bool {
        self.len == 1 && self.value == 32
    }
}

fn big_endian(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn name_of<'a>(doc: &'a Document, obj: Option<&'a Object>) -> Option<&'a [u8]> {
    match resolve(doc, obj?)? {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

fn stream_data(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

impl FontMetrics {
    pub fn estimated() -> Self {
        Self {
            codespace: Vec::new(),
            widths: Widths::Estimated,
        }
    }

    pub fn load(doc: &Document, font: &Dictionary) -> Self {
        match name_of(doc, font.get(b"Subtype").ok()) {
            Some(b"Type0") => Self::load_composite(doc, font),
            Some(b"Type3") => Self::load_simple(doc, font, type3_scale(doc, font)),
            _ => Self::load_simple(doc, font, 0.001),
        }
    }

    fn load_simple(doc: &Document, font: &Dictionary, scale: f64) -> Self {
        let missing = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|d| resolve_dict(doc, d))
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(number)
            .map(|w| w * scale);

        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .and_then(|v| u32::try_from(v).ok());
        let widths = match (first_char, font.get(b"Widths").ok().and_then(|o| resolve(doc, o))) {
            (Some(first_char), Some(Object::Array(arr))) => Widths::Simple {
                first_char,
                widths: arr
                    .iter()
                    .map(|w| resolve(doc, w).and_then(number).unwrap_or(0.0) * scale)
                    .collect(),
                missing,
            },
            _ => match missing {
                Some(width) => Widths::Simple {
                    first_char: 0,
                    widths: Vec::new(),
                    missing: Some(width),
                },
                None => Widths::Estimated,
            },
        };

        Self {
            codespace: Vec::new(),
            widths,
        }
    }

    fn load_composite(doc: &Document, font: &Dictionary) -> Self {
        let (codespace, map) = match font.get(b"Encoding").ok().and_then(|o| resolve(doc, o)) {
            Some(Object::Name(name)) => predefined_cmap(name),
            Some(Object::Stream(stream)) => embedded_cmap(&stream_data(stream)),
            _ => predefined_cmap(b"Identity-H"),
        };

        let descendant = match font.get(b"DescendantFonts").ok().and_then(|o| resolve(doc, o)) {
            Some(Object::Array(arr)) => arr.first().and_then(|o| resolve_dict(doc, o)),
            _ => None,
        };
        let default = descendant
            .and_then(|d| d.get(b"DW").ok())
            .and_then(|o| resolve(doc, o))
            .and_then(number)
            .unwrap_or(1000.0)
            * 0.001;
        let widths = descendant
            .and_then(|d| d.get(b"W").ok())
            .and_then(|o| resolve(doc, o))
            .map(|w| cid_widths(doc, w))
            .unwrap_or_default();

        Self {
            codespace,
            widths: Widths::Cid { map, widths, default },
        }
    }

    /// 从非空的 `bytes` 开头切出第一个编码
    pub fn next_code(&self, bytes: &[u8]) -> Code {
        if self.codespace.is_empty() {
            return Code {
                value: bytes[0] as u32,
                len: 1,
            };
        }
        for len in 1..=bytes.len().min(4) {
            let candidate = &bytes[..len];
            if self.codespace.iter().any(|range| range.contains(candidate)) {
                return Code {
                    value: big_endian(candidate),
                    len,
                };
            }
        }
        // 没有匹配的范围：按声明的最短长度消耗
        let len = self
            .codespace
            .iter()
            .map(CodeRange::len)
            .min()
            .unwrap_or(1)
            .clamp(1, bytes.len());
        Code {
            value: big_endian(&bytes[..len]),
            len,
        }
    }

    /// 字号为 1 时 `code` 在文字空间中的水平前进量
    pub fn width(&self, code: Code) -> f64 {
        match &self.widths {
            Widths::Estimated => {
                if code.len == 1 && code.value < 128 {
                    0.55
                } else {
                    1.0
                }
            }
            Widths::Simple {
                first_char,
                widths,
                missing,
            } => code
                .value
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .or(*missing)
                .unwrap_or(if code.value < 128 { 0.55 } else { 1.0 }),
            Widths::Cid { map, widths, default } => {
                let cid = match map {
                    CidMap::Identity => Some(code.value),
                    CidMap::Ranges(ranges) => ranges
                        .iter()
                        .find(|(lo, hi, _)| (*lo..=*hi).contains(&code.value))
                        .map(|(lo, _, cid)| cid + (code.value - lo)),
                    CidMap::Unknown => None,
                };
                cid.and_then(|cid| {
                    widths
                        .iter()
                        .rev()
                        .find(|(lo, hi, _)| (*lo..=*hi).contains(&cid))
                        .map(|(_, _, w)| *w)
                })
                .unwrap_or(*default)
            }
        }
    }
}

fn type3_scale(doc: &Document, font: &Dictionary) -> f64 {
    match font.get(b"FontMatrix").ok().and_then(|o| resolve(doc, o)) {
        Some(Object::Array(arr)) => arr.first().and_then(number).unwrap_or(0.001),
        _ => 0.001,
    }
}

fn predefined_cmap(name: &[u8]) -> (Vec<CodeRange>, CidMap) {
    let two_byte = vec![CodeRange::new(&[0x00, 0x00], &[0xFF, 0xFF])];
    match name {
        b"Identity-H" | b"Identity-V" => (two_byte, CidMap::Identity),
        _ => {
            let text = String::from_utf8_lossy(name);
            if text.contains("UCS2") || text.contains("UTF16") {
                (two_byte, CidMap::Unknown)
            } else {
                // 传统 CJK 编码：ASCII 单字节，0x81 起为前导字节
                (
                    vec![
                        CodeRange::new(&[0x00], &[0x80]),
                        CodeRange::new(&[0x81, 0x00], &[0xFE, 0xFF]),
                    ],
                    CidMap::Unknown,
                )
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Int(i64),
    Word(Vec<u8>),
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// CMap 程序的词法单元，足以读取其编码表和 CID 表
fn cmap_tokens(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        if byte.is_ascii_whitespace() {
            i += 1;
        } else if byte == b'%' {
            while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                i += 1;
            }
        } else if byte == b'<' && data.get(i + 1) != Some(&b'<') {
            let mut digits = Vec::new();
            i += 1;
            while i < data.len() && data[i] != b'>' {
                if let Some(v) = hex_value(data[i]) {
                    digits.push(v);
                }
                i += 1;
            }
            i += 1;
            if digits.len() % 2 == 1 {
                digits.push(0);
            }
            tokens.push(Token::Hex(digits.chunks(2).map(|p| (p[0] << 4) | p[1]).collect()));
        } else if b"<>[]{}()/".contains(&byte) {
            i += 1;
        } else {
            let start = i;
            while i < data.len() && !data[i].is_ascii_whitespace() && !b"<>[]{}()/%".contains(&data[i]) {
                i += 1;
            }
            let word = &data[start..i];
            match std::str::from_utf8(word).ok().and_then(|w| w.parse::<i64>().ok()) {
                Some(n) => tokens.push(Token::Int(n)),
                None => tokens.push(Token::Word(word.to_vec())),
            }
        }
    }
    tokens
}

fn embedded_cmap(data: &[u8]) -> (Vec<CodeRange>, CidMap) {
    let tokens = cmap_tokens(data);
    let mut codespace = Vec::new();
    let mut ranges = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(w) if w == b"begincodespacerange" => {
                i += 1;
                while let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) = (tokens.get(i), tokens.get(i + 1)) {
                    if lo.len() == hi.len() && !lo.is_empty() {
                        codespace.push(CodeRange::new(lo, hi));
                    }
                    i += 2;
                }
            }
            Token::Word(w) if w == b"begincidrange" => {
                i += 1;
                while let (Some(Token::Hex(lo)), Some(Token::Hex(hi)), Some(Token::Int(cid))) =
                    (tokens.get(i), tokens.get(i + 1), tokens.get(i + 2))
                {
                    if let Ok(cid) = u32::try_from(*cid) {
                        ranges.push((big_endian(lo), big_endian(hi), cid));
                    }
                    i += 3;
                }
            }
            Token::Word(w) if w == b"begincidchar" => {
                i += 1;
                while let (Some(Token::Hex(code)), Some(Token::Int(cid))) = (tokens.get(i), tokens.get(i + 1)) {
                    if let Ok(cid) = u32::try_from(*cid) {
                        let code = big_endian(code);
                        ranges.push((code, code, cid));
                    }
                    i += 2;
                }
            }
            _ => i += 1,
        }
    }

    if codespace.is_empty() {
        codespace.push(CodeRange::new(&[0x00, 0x00], &[0xFF, 0xFF]));
    }
    (codespace, CidMap::Ranges(ranges))
}

/// 读取 CID 字体的 `/W` 数组：`c [w1 w2 ...]` 和 `c_first c_last w`
fn cid_widths(doc: &Document, w: &Object) -> Vec<(u32, u32, f64)> {
    let items = match w {
        Object::Array(items) => items,
        _ => return Vec::new(),
    };
    let mut out = Vec::new();
    let mut i = 0;
    while i < items.len() {
        let first = match items[i].as_i64().ok().and_then(|v| u32::try_from(v).ok()) {
            Some(first) => first,
            None => break,
        };
        match items.get(i + 1).and_then(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, width) in list.iter().enumerate() {
                    if let Some(width) = number(width) {
                        let cid = first + offset as u32;
                        out.push((cid, cid, width * 0.001));
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = last.as_i64().ok().and_then(|v| u32::try_from(v).ok());
                let width = items.get(i + 2).and_then(number);
                if let (Some(last), Some(width)) = (last, width) {
                    out.push((first, last, width * 0.001));
                }
                i += 3;
            }
            None => break,
        }
    }
    out
}

/// 一个资源字典中的字体，按资源名索引
#[derive(Debug, Clone)]
pub(crate) struct Fonts {
    by_name: BTreeMap<Vec<u8>, FontMetrics>,
    fallback: FontMetrics,
}

impl Default for Fonts {
    fn default() -> Self {
        Self {
            by_name: BTreeMap::new(),
            fallback: FontMetrics::estimated(),
        }
    }
}

impl Fonts {
    pub fn load(doc: &Document, resources: &Dictionary) -> Self {
        let mut fonts = Self::default();
        let dict = match resources.get(b"Font").ok().and_then(|o| resolve_dict(doc, o)) {
            Some(dict) => dict,
            None => return fonts,
        };
        for (name, entry) in dict.iter() {
            if let Some(font) = resolve_dict(doc, entry) {
                fonts.by_name.insert(name.clone(), FontMetrics::load(doc, font));
            }
        }
        fonts
    }

    /// `Tf` 名称对应的度量；未知名称使用估算宽度
    pub fn get(&self, name: &[u8]) -> &FontMetrics {
        self.by_name.get(name).unwrap_or(&self.fallback)
    }

    /// 第一个 `Tf` 之前生效的度量
    pub fn fallback(&self) -> &FontMetrics {
        &self.fallback
    }
}
