use std::{
    ffi::{CStr, c_int, c_void},
    ptr,
};

use ffmpeg_next::{
    Codec,
    ffi::{self, AVCodec, AVCodecConfig, AVMediaType, AVPixelFormat},
};
use vaccel_core::{
    CodecCategory, PixelFormat,
    codec::{CodecInfo, CodecRegistry, HwConfig, HwConfigMethods},
};

use crate::format::{codec_id, device_type, pixel_format};

/// Video codecs compiled into the linked libavcodec.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegCodecRegistry;

impl CodecRegistry for FfmpegCodecRegistry {
    type Handle = Codec;

    fn codecs(&self) -> impl Iterator<Item = CodecInfo<Codec>> + '_ {
        let mut opaque: *mut c_void = ptr::null_mut();
        std::iter::from_fn(move || {
            let codec = unsafe { ffi::av_codec_iterate(&mut opaque) };
            (!codec.is_null()).then_some(codec)
        })
        .filter(|&codec| unsafe { (*codec).type_ == AVMediaType::AVMEDIA_TYPE_VIDEO })
        .filter_map(|codec| unsafe { codec_info(codec) })
    }
}

unsafe fn codec_info(codec: *const AVCodec) -> Option<CodecInfo<Codec>> {
    let name = unsafe { CStr::from_ptr((*codec).name) }.to_str().ok()?;
    let (category, handle) = if unsafe { ffi::av_codec_is_decoder(codec) } != 0 {
        (CodecCategory::Decoder, ffmpeg_next::decoder::find_by_name(name)?)
    } else {
        (CodecCategory::Encoder, ffmpeg_next::encoder::find_by_name(name)?)
    };

    Some(CodecInfo {
        name: name.to_owned(),
        id: codec_id(handle.id()),
        category,
        experimental: unsafe { (*codec).capabilities } & ffi::AV_CODEC_CAP_EXPERIMENTAL as c_int
            != 0,
        pixel_formats: unsafe { pixel_formats(codec) },
        hw_configs: unsafe { hw_configs(codec) },
        handle,
    })
}

unsafe fn pixel_formats(codec: *const AVCodec) -> Vec<PixelFormat> {
    let mut configs: *const c_void = ptr::null();
    let mut count: c_int = 0;
    let ret = unsafe {
        ffi::avcodec_get_supported_config(
            ptr::null(),
            codec,
            AVCodecConfig::AV_CODEC_CONFIG_PIX_FORMAT,
            0,
            &mut configs,
            &mut count,
        )
    };
    if ret < 0 || configs.is_null() {
        return Vec::new();
    }

    let formats =
        unsafe { std::slice::from_raw_parts(configs as *const AVPixelFormat, count as usize) };
    formats.iter().copied().map(pixel_format).collect()
}

unsafe fn hw_configs(codec: *const AVCodec) -> Vec<HwConfig> {
    (0..)
        .map_while(|index| {
            let config = unsafe { ffi::avcodec_get_hw_config(codec, index) };
            unsafe { config.as_ref() }
        })
        .map(|config| HwConfig {
            device_type: device_type(config.device_type),
            pix_fmt: pixel_format(config.pix_fmt),
            methods: HwConfigMethods {
                device_ctx: config.methods & ffi::AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as c_int
                    != 0,
                frames_ctx: config.methods & ffi::AV_CODEC_HW_CONFIG_METHOD_HW_FRAMES_CTX as c_int
                    != 0,
                internal: config.methods & ffi::AV_CODEC_HW_CONFIG_METHOD_INTERNAL as c_int != 0,
            },
        })
        .collect()
}
