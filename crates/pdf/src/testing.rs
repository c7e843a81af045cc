//! 单元测试用的内存 PDF 构造工具

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

pub(crate) struct TestPage {
    pub content: Vec<u8>,
    pub media_box: [i64; 4],
    pub rotate: Option<i64>,
    pub xobjects: Vec<(&'static str, Stream)>,
    pub fonts: Vec<(&'static str, Dictionary)>,
}

impl TestPage {
    pub fn new(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            media_box: [0, 0, 612, 792],
            rotate: None,
            xobjects: Vec::new(),
            fonts: Vec::new(),
        }
    }

    pub fn rotated(mut self, degrees: i64) -> Self {
        self.rotate = Some(degrees);
        self
    }

    /// 添加图片或表单 XObject
    pub fn with_xobject(mut self, name: &'static str, stream: Stream) -> Self {
        self.xobjects.push((name, stream));
        self
    }

    pub fn with_font(mut self, name: &'static str, font: Dictionary) -> Self {
        self.fonts.push((name, font));
        self
    }
}

/// 单色填充的未压缩 8 位 RGB 图片
pub(crate) fn rgb_image(width: i64, height: i64, value: u8) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        vec![value; (width * height * 3) as usize],
    )
}

/// 全黑的 1 位 DeviceGray 图片
pub(crate) fn bilevel_image(width: i64, height: i64) -> Stream {
    let row = (width as usize + 7) / 8;
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 1,
        },
        vec![0; row * height as usize],
    )
}

/// 覆盖 Letter 页面的表单 XObject
pub(crate) fn form_xobject(content: &[u8]) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        },
        content.to_vec(),
    )
}

/// Identity-H 编码、字宽半个 em 的 Type0 字体
pub(crate) fn identity_font() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "TestCID",
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Dictionary(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "TestCID",
            "DW" => 500,
        })],
    }
}

/// 构建文档；使用同名 XObject 的页面共享同一个对象
pub(crate) fn build_pdf(pages: Vec<TestPage>) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut shared: Vec<(&'static str, lopdf::ObjectId)> = Vec::new();
    let mut kids = Vec::new();
    for page in pages {
        let mut xobjects = Dictionary::new();
        for (name, stream) in page.xobjects {
            let id = match shared.iter().find(|(n, _)| *n == name) {
                Some((_, id)) => *id,
                None => {
                    let id = doc.add_object(stream);
                    shared.push((name, id));
                    id
                }
            };
            xobjects.set(name, Object::Reference(id));
        }

        let mut fonts = dictionary! { "F1" => Object::Reference(font_id) };
        for (name, font) in page.fonts {
            fonts.set(name, Object::Dictionary(font));
        }

        let content_id = doc.add_object(Stream::new(Dictionary::new(), page.content));
        let [a, b, c, d] = page.media_box;
        let mut dict = dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![a.into(), b.into(), c.into(), d.into()],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "Font" => fonts,
                "XObject" => xobjects,
            },
        };
        if let Some(rotate) = page.rotate {
            dict.set("Rotate", rotate);
        }
        kids.push(Object::Reference(doc.add_object(dict)));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub(crate) fn page_dict(doc: &Document, page_number: u32) -> &Dictionary {
    let id = doc.get_pages()[&page_number];
    doc.get_dictionary(id).unwrap()
}

pub(crate) fn page_operations(bytes: &[u8], page_number: u32) -> Vec<Operation> {
    let doc = Document::load_mem(bytes).unwrap();
    let id = doc.get_pages()[&page_number];
    let data = doc.get_page_content(id).unwrap();
    Content::decode(&data).unwrap().operations
}

pub(crate) fn page_content_bytes(bytes: &[u8], page_number: u32) -> Vec<u8> {
    let doc = Document::load_mem(bytes).unwrap();
    let id = doc.get_pages()[&page_number];
    doc.get_page_content(id).unwrap()
}

/// 页面上所有显示的字符串，按顺序拼接
pub(crate) fn shown_text(operations: &[Operation]) -> String {
    let mut text = String::new();
    for op in operations {
        for operand in &op.operands {
            match operand {
                Object::String(bytes, _) => text.push_str(&String::from_utf8_lossy(bytes)),
                Object::Array(arr) => {
                    for item in arr {
                        if let Object::String(bytes, _) = item {
                            text.push_str(&String::from_utf8_lossy(bytes));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    text
}

/// 页面上图片 `name` 解码后的采样
pub(crate) fn image_samples(bytes: &[u8], page_number: u32, name: &str) -> Vec<u8> {
    xobject_data(bytes, page_number, name)
}

/// 页面上 XObject `name` 去掉滤镜后的数据
pub(crate) fn xobject_data(bytes: &[u8], page_number: u32, name: &str) -> Vec<u8> {
    let doc = Document::load_mem(bytes).unwrap();
    let page = page_dict(&doc, page_number);
    let resources = match page.get(b"Resources").unwrap() {
        Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
        Object::Dictionary(dict) => dict,
        other => panic!("unexpected resources {:?}", other),
    };
    let xobjects = match resources.get(b"XObject").unwrap() {
        Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
        Object::Dictionary(dict) => dict,
        other => panic!("unexpected xobjects {:?}", other),
    };
    let id = xobjects.get(name.as_bytes()).unwrap().as_reference().unwrap();
    let stream = doc.get_object(id).unwrap().as_stream().unwrap();
    if stream.dict.has(b"Filter") {
        // lopdf 不会为图片类型的流解压
        let mut plain = stream.clone();
        plain.dict.remove(b"Subtype");
        plain.decompressed_content().unwrap()
    } else {
        stream.content.clone()
    }
}

/// 文件中所有流（能解压的先解压）拼在一起
pub(crate) fn all_stream_bytes(bytes: &[u8]) -> Vec<u8> {
    let doc = Document::load_mem(bytes).unwrap();
    let mut out = Vec::new();
    for object in doc.objects.values() {
        if let Object::Stream(stream) = object {
            let mut plain = stream.clone();
            plain.dict.remove(b"Subtype");
            out.extend(plain.decompressed_content().unwrap_or_else(|_| stream.content.clone()));
            out.push(b'\n');
        }
    }
    out
}
