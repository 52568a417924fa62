//! Conversion Benchmarks
//!
//! Format token resolution, raster conversion and document rendering.
//!
//! Run with: `cargo bench --bench conversion`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::{Cursor, Write};
use std::time::Duration;

use reformat_server::codecs::{AlphaPolicy, Converter, DocumentConverter, RasterConverter, SourceHint};
use reformat_server::formats::{self, CanonicalFormat};

/// Gradient PNG of the given size
fn create_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// ODT package with `paragraphs` lines of body text
fn create_odt(paragraphs: usize) -> Vec<u8> {
    use zip::{write::SimpleFileOptions, ZipWriter};

    let body: String = (0..paragraphs)
        .map(|i| format!("<text:p>Paragraph {i} of the benchmark document.</text:p>"))
        .collect();
    let content = format!(
        r#"<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0"><office:body><office:text>{body}</office:text></office:body></office:document-content>"#
    );

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("content.xml", SimpleFileOptions::default()).unwrap();
    zip.write_all(content.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    for token in ["png", " JPG ", "tiff", "docx", "bogus"] {
        group.bench_with_input(BenchmarkId::from_parameter(token.trim()), token, |b, token| {
            b.iter(|| formats::resolve(black_box(token)))
        });
    }
    group.finish();
}

fn bench_raster(c: &mut Criterion) {
    let mut group = c.benchmark_group("png_to_jpeg");
    group.measurement_time(Duration::from_secs(10));
    let converter = RasterConverter::new(AlphaPolicy::Flatten);

    for size in [64u32, 512, 1024] {
        let input = create_png(size, size);
        let source = SourceHint::Raster(image::ImageFormat::Png);
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                converter
                    .convert(black_box(input), source, CanonicalFormat::Jpeg)
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_document(c: &mut Criterion) {
    let mut group = c.benchmark_group("odt_to_pdf");
    let source = SourceHint::Document(CanonicalFormat::Odt);
    let converter = DocumentConverter::default();

    for paragraphs in [10usize, 500] {
        let input = create_odt(paragraphs);
        group.bench_with_input(BenchmarkId::from_parameter(paragraphs), &input, |b, input| {
            b.iter(|| {
                converter
                    .convert(black_box(input), source, CanonicalFormat::Pdf)
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_raster, bench_document);
criterion_main!(benches);
