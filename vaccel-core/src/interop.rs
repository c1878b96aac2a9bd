//! Zero-copy transfer between codec surfaces and compute images.
//!
//! Every copy first checks that the compute context was created on the very
//! native device that owns the frame. Any mismatch makes the copy return
//! `false` without touching the destination, and the caller falls back to a
//! CPU transfer.

use tracing::debug;

use crate::{
    backend::{BackendCatalog, BackendKind},
    catalog::HwDeviceType,
    compute::{self, ComputeApi, ComputeContext, ComputeError, FrameSize},
    device::DeviceContext,
    frames::FramesPool,
    hwcontext::{HwContextApi, HwContextError, NativeDevice, NativeHandle, NativeTexture, RawHandle},
};

/// Location of a decoded frame in device memory, as seen by the base device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeSurface {
    VaSurface(u32),
    D3d11Texture {
        texture: RawHandle,
        /// Slice index for array textures, `None` for standalone textures.
        subresource: Option<u32>,
    },
}

pub trait NativeFrame {
    fn size(&self) -> FrameSize;

    /// `None` when the frame's memory can't be resolved to a base surface.
    fn surface(&self) -> Option<NativeSurface>;
}

#[derive(Debug, thiserror::Error)]
enum InteropError {
    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Native(#[from] HwContextError),
}

/// Converts `frame` into the compute image `dst`.
///
/// Array texture slices are copied through the single slice texture of `pool`.
/// Taking the pool by `&mut` keeps that copy from running concurrently.
pub fn copy_from_device<A: HwContextApi, C: ComputeApi>(
    api: &A,
    compute: &ComputeContext<C>,
    catalog: &BackendCatalog,
    device: Option<&DeviceContext<A::Device>>,
    pool: Option<&mut FramesPool<A>>,
    frame: &impl NativeFrame,
    dst: &mut C::Image,
) -> bool {
    let Some((device, device_type)) = shared_device(compute, catalog, device) else {
        return false;
    };
    let Some(surface) = frame.surface() else {
        return false;
    };
    let media = device.media_context();
    let compute_api = compute.api();

    let mut copy = || -> Result<bool, InteropError> {
        match (backend_kind(catalog, device_type), surface, media.native().handle()) {
            (
                Some(BackendKind::DisplaySurface),
                NativeSurface::VaSurface(surface),
                NativeHandle::VaDisplay(display),
            ) => compute_api.convert_from_va_surface(display, surface, frame.size(), dst)?,
            (
                Some(BackendKind::ArrayTexture),
                NativeSurface::D3d11Texture {
                    texture,
                    subresource: None,
                },
                _,
            ) => compute_api.convert_from_d3d11_texture(texture, dst)?,
            (
                Some(BackendKind::ArrayTexture),
                NativeSurface::D3d11Texture {
                    texture,
                    subresource: Some(index),
                },
                _,
            ) => {
                let Some(single) = single_texture(pool) else {
                    return Ok(false);
                };
                api.copy_subresource(media.native(), single, 0, texture, index)?;
                compute_api.convert_from_d3d11_texture(single, dst)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    };

    copy().unwrap_or_else(|err| {
        debug!("Interop copy from {device_type} surface failed: {err}");
        false
    })
}

/// Converts the compute image `src` into `frame`.
pub fn copy_to_device<A: HwContextApi, C: ComputeApi>(
    api: &A,
    compute: &ComputeContext<C>,
    catalog: &BackendCatalog,
    device: Option<&DeviceContext<A::Device>>,
    pool: Option<&mut FramesPool<A>>,
    src: &C::Image,
    frame: &impl NativeFrame,
) -> bool {
    let Some((device, device_type)) = shared_device(compute, catalog, device) else {
        return false;
    };
    let Some(surface) = frame.surface() else {
        return false;
    };
    let media = device.media_context();
    let compute_api = compute.api();

    let copy = || -> Result<bool, InteropError> {
        match (backend_kind(catalog, device_type), surface, media.native().handle()) {
            (
                Some(BackendKind::DisplaySurface),
                NativeSurface::VaSurface(surface),
                NativeHandle::VaDisplay(display),
            ) => compute_api.convert_to_va_surface(display, src, surface, frame.size())?,
            (
                Some(BackendKind::ArrayTexture),
                NativeSurface::D3d11Texture {
                    texture,
                    subresource: None,
                },
                _,
            ) => compute_api.convert_to_d3d11_texture(src, texture)?,
            (
                Some(BackendKind::ArrayTexture),
                NativeSurface::D3d11Texture {
                    texture,
                    subresource: Some(index),
                },
                _,
            ) => {
                let Some(single) = single_texture(pool) else {
                    return Ok(false);
                };
                compute_api.convert_to_d3d11_texture(src, single)?;
                api.copy_subresource(media.native(), texture, index, single, 0)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    };

    copy().unwrap_or_else(|err| {
        debug!("Interop copy to {device_type} surface failed: {err}");
        false
    })
}

fn single_texture<A: HwContextApi>(pool: Option<&mut FramesPool<A>>) -> Option<RawHandle> {
    pool?.single_texture().map(NativeTexture::raw)
}

fn shared_device<'a, C: ComputeApi, D: NativeDevice>(
    compute: &ComputeContext<C>,
    catalog: &BackendCatalog,
    device: Option<&'a DeviceContext<D>>,
) -> Option<(&'a DeviceContext<D>, HwDeviceType)> {
    let device = device?;
    let device_type = compute::shared_device_type(compute, catalog, device)?;
    Some((device, device_type))
}

fn backend_kind(catalog: &BackendCatalog, device_type: HwDeviceType) -> Option<BackendKind> {
    catalog.backend(device_type).map(|backend| backend.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{Platform, PixelFormat},
        compute::{ContextProperty, SharingKey},
        frames::create_frames,
        test_utils::{Conversion, FakeCompute, FakeFrame, FakeHwContext, FakeImage},
    };

    fn bound_compute(key: SharingKey, handle: RawHandle) -> ComputeContext<FakeCompute> {
        ComputeContext::with_properties(
            FakeCompute::default(),
            vec![ContextProperty { key, value: handle }],
        )
    }

    #[test]
    fn va_surface_round_trip() {
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let api = FakeHwContext::default().with_device(HwDeviceType::Vaapi, None);
        let device = api.device_context(HwDeviceType::Vaapi);
        let (_, display) = device.media_handle().unwrap();
        let compute = bound_compute(SharingKey::VA_API_DISPLAY, display);
        let frame = FakeFrame::new(NativeSurface::VaSurface(7));
        let mut image = FakeImage::default();

        assert!(copy_from_device(
            &api,
            &compute,
            &catalog,
            Some(&device),
            None,
            &frame,
            &mut image
        ));
        assert!(image.written);
        assert!(copy_to_device(
            &api,
            &compute,
            &catalog,
            Some(&device),
            None,
            &image,
            &frame
        ));

        assert_eq!(
            compute.api().conversions(),
            vec![
                Conversion::FromVaSurface {
                    display,
                    surface: 7
                },
                Conversion::ToVaSurface {
                    display,
                    surface: 7
                },
            ]
        );
    }

    #[test]
    fn mismatched_handles_fail_closed() {
        for (platform, device_type, key, surface) in [
            (
                Platform::Linux,
                HwDeviceType::Vaapi,
                SharingKey::VA_API_DISPLAY,
                NativeSurface::VaSurface(1),
            ),
            (
                Platform::Windows,
                HwDeviceType::D3d11va,
                SharingKey::D3D11_DEVICE,
                NativeSurface::D3d11Texture {
                    texture: RawHandle::new(0xbeef),
                    subresource: None,
                },
            ),
        ] {
            let catalog = BackendCatalog::for_platform(platform);
            let api = FakeHwContext::default().with_device(device_type, None);
            let device = api.device_context(device_type);
            let compute = bound_compute(key, RawHandle::new(0xdead));
            let frame = FakeFrame::new(surface);
            let mut image = FakeImage::default();

            assert!(!copy_from_device(
                &api,
                &compute,
                &catalog,
                Some(&device),
                None,
                &frame,
                &mut image
            ));
            assert!(!copy_to_device(
                &api,
                &compute,
                &catalog,
                Some(&device),
                None,
                &image,
                &frame
            ));
            assert!(!image.written);
            assert!(compute.api().conversions().is_empty());
        }
    }

    #[test]
    fn layered_qsv_mismatch_fails_closed() {
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let api = FakeHwContext::default().with_device(HwDeviceType::Vaapi, None);
        let qsv = api.derived_context(HwDeviceType::Qsv, HwDeviceType::Vaapi);
        let compute = bound_compute(SharingKey::VA_API_DISPLAY, RawHandle::new(0xdead));
        let mut image = FakeImage::default();

        assert!(!copy_from_device(
            &api,
            &compute,
            &catalog,
            Some(&qsv),
            None,
            &FakeFrame::new(NativeSurface::VaSurface(3)),
            &mut image
        ));
        assert!(!image.written);
    }

    #[test]
    fn layered_qsv_uses_base_display() {
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let api = FakeHwContext::default().with_device(HwDeviceType::Vaapi, None);
        let qsv = api.derived_context(HwDeviceType::Qsv, HwDeviceType::Vaapi);
        let (_, display) = qsv.media_handle().unwrap();
        let compute = bound_compute(SharingKey::VA_API_DISPLAY, display);
        let mut image = FakeImage::default();

        assert!(copy_from_device(
            &api,
            &compute,
            &catalog,
            Some(&qsv),
            None,
            &FakeFrame::new(NativeSurface::VaSurface(3)),
            &mut image
        ));
        assert!(image.written);
    }

    #[test]
    fn layered_qsv_frame_uploads_to_base_surface() {
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let api = FakeHwContext::default().with_device(HwDeviceType::Vaapi, None);
        let qsv = api.derived_context(HwDeviceType::Qsv, HwDeviceType::Vaapi);
        let (_, display) = qsv.media_handle().unwrap();
        let compute = bound_compute(SharingKey::VA_API_DISPLAY, display);

        assert!(copy_to_device(
            &api,
            &compute,
            &catalog,
            Some(&qsv),
            None,
            &FakeImage::default(),
            &FakeFrame::new(NativeSurface::VaSurface(11))
        ));
        assert_eq!(
            compute.api().conversions(),
            vec![Conversion::ToVaSurface {
                display,
                surface: 11
            }]
        );
    }

    #[test]
    fn missing_device_or_empty_compute() {
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let api = FakeHwContext::default().with_device(HwDeviceType::Vaapi, None);
        let device = api.device_context(HwDeviceType::Vaapi);
        let frame = FakeFrame::new(NativeSurface::VaSurface(1));
        let mut image = FakeImage::default();

        let empty = ComputeContext::new(FakeCompute::default());
        assert!(!copy_from_device(
            &api,
            &empty,
            &catalog,
            Some(&device),
            None,
            &frame,
            &mut image
        ));

        let (_, display) = device.media_handle().unwrap();
        let bound = bound_compute(SharingKey::VA_API_DISPLAY, display);
        assert!(!copy_from_device(
            &api, &bound, &catalog, None, None, &frame, &mut image
        ));
        assert!(!image.written);
    }

    #[test]
    fn standalone_d3d11_texture_converts_directly() {
        let catalog = BackendCatalog::for_platform(Platform::Windows);
        let api = FakeHwContext::default().with_device(HwDeviceType::D3d11va, None);
        let device = api.device_context(HwDeviceType::D3d11va);
        let (_, handle) = device.media_handle().unwrap();
        let compute = bound_compute(SharingKey::D3D11_DEVICE, handle);
        let texture = RawHandle::new(0x5000);
        let frame = FakeFrame::new(NativeSurface::D3d11Texture {
            texture,
            subresource: None,
        });
        let mut image = FakeImage::default();

        assert!(copy_from_device(
            &api,
            &compute,
            &catalog,
            Some(&device),
            None,
            &frame,
            &mut image
        ));
        assert_eq!(
            compute.api().conversions(),
            vec![Conversion::FromD3d11Texture(texture)]
        );
        assert!(api.subresource_copies().is_empty());
    }

    #[test]
    fn array_slice_goes_through_single_slice_texture() {
        let catalog = BackendCatalog::for_platform(Platform::Windows);
        let api = FakeHwContext::default().with_device(HwDeviceType::D3d11va, None);
        let device = api.device_context(HwDeviceType::D3d11va);
        let (_, handle) = device.media_handle().unwrap();
        let compute = bound_compute(SharingKey::D3D11_DEVICE, handle);
        let mut pool =
            create_frames(&api, &catalog, &device, None, 320, 240, PixelFormat::D3d11).unwrap();
        let single = pool.single_texture().map(NativeTexture::raw).unwrap();
        let array = RawHandle::new(0x6000);
        let frame = FakeFrame::new(NativeSurface::D3d11Texture {
            texture: array,
            subresource: Some(5),
        });
        let mut image = FakeImage::default();

        assert!(copy_from_device(
            &api,
            &compute,
            &catalog,
            Some(&device),
            Some(&mut pool),
            &frame,
            &mut image
        ));
        assert!(copy_to_device(
            &api,
            &compute,
            &catalog,
            Some(&device),
            Some(&mut pool),
            &image,
            &frame
        ));

        assert_eq!(
            api.subresource_copies(),
            vec![(single, 0, array, 5), (array, 5, single, 0)]
        );
        assert_eq!(
            compute.api().conversions(),
            vec![
                Conversion::FromD3d11Texture(single),
                Conversion::ToD3d11Texture(single),
            ]
        );
    }

    #[test]
    fn array_slice_without_pool_is_refused() {
        let catalog = BackendCatalog::for_platform(Platform::Windows);
        let api = FakeHwContext::default().with_device(HwDeviceType::D3d11va, None);
        let device = api.device_context(HwDeviceType::D3d11va);
        let (_, handle) = device.media_handle().unwrap();
        let compute = bound_compute(SharingKey::D3D11_DEVICE, handle);
        let frame = FakeFrame::new(NativeSurface::D3d11Texture {
            texture: RawHandle::new(0x6000),
            subresource: Some(1),
        });
        let mut image = FakeImage::default();

        assert!(!copy_from_device(
            &api,
            &compute,
            &catalog,
            Some(&device),
            None,
            &frame,
            &mut image
        ));
        assert!(!image.written);
    }

    #[test]
    fn surface_of_other_backend_is_refused() {
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let api = FakeHwContext::default().with_device(HwDeviceType::Vaapi, None);
        let device = api.device_context(HwDeviceType::Vaapi);
        let (_, display) = device.media_handle().unwrap();
        let compute = bound_compute(SharingKey::VA_API_DISPLAY, display);
        let frame = FakeFrame::new(NativeSurface::D3d11Texture {
            texture: RawHandle::new(0x1),
            subresource: None,
        });
        let mut image = FakeImage::default();

        assert!(!copy_from_device(
            &api,
            &compute,
            &catalog,
            Some(&device),
            None,
            &frame,
            &mut image
        ));
    }
}
