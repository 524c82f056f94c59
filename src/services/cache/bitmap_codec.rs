// 位图编解码器 - 预览图的解码、缩放和磁盘格式
//
// 本模块提供预览缓存需要的位图能力，包括：
// - 原始图片数据（jpg、png、gif、webp）解码为指定宽度的位图
// - 位图无损编码为 WebP（磁盘缓存格式）
// - 磁盘缓存文件解码（损坏文件返回错误，由缓存负责清理）
// - 位图编码为 PNG（HTTP 接口输出）

use crate::services::cache::error::ConversionError;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ColorType, ImageEncoder, RgbaImage};
use std::sync::Arc;
use tokio::task;

/// 解码后的预览位图（在内存层和调用方之间共享）
pub type Bitmap = Arc<RgbaImage>;

/// 位图编解码器
pub struct BitmapCodec;

impl BitmapCodec {
    /// 解码宽度上限（像素）
    pub const MAX_DECODE_WIDTH: u32 = 8192;

    /// 缩放后高度上限（像素）
    pub const MAX_DECODE_HEIGHT: u32 = 16384;

    /// 将原始图片数据解码为指定宽度的位图（保持宽高比）
    ///
    /// # 参数
    /// - `image_data`: 原始图片数据
    /// - `width`: 目标宽度（像素，1 到 `MAX_DECODE_WIDTH`）
    pub fn decode_to_width(image_data: &[u8], width: u32) -> Result<RgbaImage, ConversionError> {
        Self::check_width(width)?;
        if image_data.is_empty() {
            return Err(ConversionError::CorruptedData);
        }

        let img = image::load_from_memory(image_data)?;
        Self::scale_to_width(img.to_rgba8(), width)
    }

    /// 异步解码，CPU 密集型操作放到阻塞线程池
    pub async fn decode_to_width_async(
        image_data: Vec<u8>,
        width: u32,
    ) -> Result<RgbaImage, ConversionError> {
        task::spawn_blocking(move || Self::decode_to_width(&image_data, width))
            .await
            .map_err(|e| ConversionError::TaskFailed(e.to_string()))?
    }

    /// 位图无损编码为 WebP（磁盘缓存格式）
    pub fn encode_lossless(bitmap: &RgbaImage) -> Result<Vec<u8>, ConversionError> {
        let (width, height) = bitmap.dimensions();
        if width == 0 || height == 0 {
            return Err(ConversionError::EncodeFailed("空位图".to_string()));
        }

        let encoder = webp::Encoder::from_rgba(bitmap.as_raw(), width, height);
        let webp_data = encoder.encode_lossless();
        Ok(webp_data.to_vec())
    }

    /// 解码磁盘缓存文件，并缩放到请求的宽度
    ///
    /// 任何解码失败都视为文件损坏
    pub fn decode_cached(data: &[u8], width: u32) -> Result<RgbaImage, ConversionError> {
        Self::check_width(width)?;

        let decoded = webp::Decoder::new(data)
            .decode()
            .ok_or(ConversionError::CorruptedData)?;
        let rgba = decoded.to_image().to_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(ConversionError::CorruptedData);
        }

        Self::scale_to_width(rgba, width)
    }

    /// 位图编码为 PNG
    pub fn encode_png(bitmap: &RgbaImage) -> Result<Vec<u8>, ConversionError> {
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(
                bitmap.as_raw(),
                bitmap.width(),
                bitmap.height(),
                ColorType::Rgba8,
            )
            .map_err(|e| ConversionError::EncodeFailed(e.to_string()))?;
        Ok(buffer)
    }

    fn check_width(width: u32) -> Result<(), ConversionError> {
        if width == 0 || width > Self::MAX_DECODE_WIDTH {
            return Err(ConversionError::InvalidWidth(width));
        }
        Ok(())
    }

    /// 按比例缩放后的高度（至少 1 像素）
    fn scaled_height(src_width: u32, src_height: u32, width: u32) -> Result<u32, ConversionError> {
        let height = (u64::from(src_height) * u64::from(width) / u64::from(src_width.max(1))).max(1);
        u32::try_from(height)
            .ok()
            .filter(|h| *h <= Self::MAX_DECODE_HEIGHT)
            .ok_or(ConversionError::DimensionsTooLarge { width, height })
    }

    /// 缩放到固定宽度，高度按比例计算
    fn scale_to_width(rgba: RgbaImage, width: u32) -> Result<RgbaImage, ConversionError> {
        let (src_width, src_height) = rgba.dimensions();
        if src_width == width {
            return Ok(rgba);
        }

        let height = Self::scaled_height(src_width, src_height, width)?;
        Ok(image::imageops::resize(&rgba, width, height, FilterType::Triangle))
    }
}
