//! Conversions between libav tags and the `vaccel-core` enums.

use ffmpeg_next::{
    codec::Id,
    ffi::{AVCodecID, AVHWDeviceType, AVPixelFormat},
};
use vaccel_core::{CodecId, HwDeviceType, PixelFormat};

pub fn av_device_type(device_type: HwDeviceType) -> AVHWDeviceType {
    match device_type {
        HwDeviceType::None => AVHWDeviceType::AV_HWDEVICE_TYPE_NONE,
        HwDeviceType::Vaapi => AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
        HwDeviceType::D3d11va => AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA,
        HwDeviceType::Qsv => AVHWDeviceType::AV_HWDEVICE_TYPE_QSV,
    }
}

pub fn device_type(device_type: AVHWDeviceType) -> HwDeviceType {
    match device_type {
        AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI => HwDeviceType::Vaapi,
        AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA => HwDeviceType::D3d11va,
        AVHWDeviceType::AV_HWDEVICE_TYPE_QSV => HwDeviceType::Qsv,
        _ => HwDeviceType::None,
    }
}

pub fn pixel_format(format: AVPixelFormat) -> PixelFormat {
    match format {
        AVPixelFormat::AV_PIX_FMT_NONE => PixelFormat::None,
        AVPixelFormat::AV_PIX_FMT_NV12 => PixelFormat::Nv12,
        AVPixelFormat::AV_PIX_FMT_P010LE => PixelFormat::P010,
        AVPixelFormat::AV_PIX_FMT_YUV420P => PixelFormat::Yuv420p,
        AVPixelFormat::AV_PIX_FMT_BGR24 => PixelFormat::Bgr24,
        AVPixelFormat::AV_PIX_FMT_VAAPI => PixelFormat::Vaapi,
        AVPixelFormat::AV_PIX_FMT_D3D11 => PixelFormat::D3d11,
        AVPixelFormat::AV_PIX_FMT_QSV => PixelFormat::Qsv,
        other => PixelFormat::Other(other as i32),
    }
}

/// `None` for formats only known by their raw value.
pub fn av_pixel_format(format: PixelFormat) -> Option<AVPixelFormat> {
    let format = match format {
        PixelFormat::None => AVPixelFormat::AV_PIX_FMT_NONE,
        PixelFormat::Nv12 => AVPixelFormat::AV_PIX_FMT_NV12,
        PixelFormat::P010 => AVPixelFormat::AV_PIX_FMT_P010LE,
        PixelFormat::Yuv420p => AVPixelFormat::AV_PIX_FMT_YUV420P,
        PixelFormat::Bgr24 => AVPixelFormat::AV_PIX_FMT_BGR24,
        PixelFormat::Vaapi => AVPixelFormat::AV_PIX_FMT_VAAPI,
        PixelFormat::D3d11 => AVPixelFormat::AV_PIX_FMT_D3D11,
        PixelFormat::Qsv => AVPixelFormat::AV_PIX_FMT_QSV,
        PixelFormat::Other(_) => return None,
    };
    Some(format)
}

pub fn codec_id(id: Id) -> CodecId {
    match id {
        Id::H263 => CodecId::H263,
        Id::H264 => CodecId::H264,
        Id::HEVC => CodecId::Hevc,
        Id::MPEG2VIDEO => CodecId::Mpeg2Video,
        Id::MPEG4 => CodecId::Mpeg4,
        Id::VC1 => CodecId::Vc1,
        Id::VP8 => CodecId::Vp8,
        Id::VP9 => CodecId::Vp9,
        Id::WMV3 => CodecId::Wmv3,
        Id::AV1 => CodecId::Av1,
        Id::MJPEG => CodecId::Mjpeg,
        other => CodecId::Other(AVCodecID::from(other) as i32),
    }
}
