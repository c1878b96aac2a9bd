use std::ffi::c_void;

use vaccel_core::{
    HwContextError, PixelFormat,
    hwcontext::{NativeTexture, RawHandle, TextureDesc},
};
use windows::{
    Win32::Graphics::{
        Direct3D11::{
            D3D11_TEXTURE2D_DESC, D3D11_USAGE_DEFAULT, ID3D11Device, ID3D11DeviceContext,
            ID3D11Resource, ID3D11Texture2D,
        },
        Dxgi::{
            Common::{DXGI_FORMAT, DXGI_FORMAT_NV12, DXGI_FORMAT_P010, DXGI_SAMPLE_DESC},
            IDXGIDevice,
        },
    },
    core::Interface,
};

#[derive(Debug)]
pub struct D3d11Texture(ID3D11Texture2D);

impl NativeTexture for D3d11Texture {
    fn raw(&self) -> RawHandle {
        RawHandle::from_ptr(self.0.as_raw())
    }
}

fn native_error(operation: &'static str, err: windows::core::Error) -> HwContextError {
    HwContextError::Native {
        operation,
        code: err.code().0,
    }
}

fn borrowed<'a, T: Interface>(
    handle: &'a *mut c_void,
    operation: &'static str,
) -> Result<&'a T, HwContextError> {
    unsafe { T::from_raw_borrowed(handle) }.ok_or(HwContextError::NullContext { operation })
}

/// Takes a new reference on `device` for a context that releases it later.
pub(super) fn add_ref(device: RawHandle) -> Result<*mut c_void, HwContextError> {
    let raw = device.as_ptr::<c_void>();
    let device = borrowed::<ID3D11Device>(&raw, "ID3D11Device::AddRef")?;
    Ok(device.clone().into_raw())
}

pub(super) fn adapter_description(device: RawHandle) -> Option<String> {
    let raw = device.as_ptr::<c_void>();
    let device = borrowed::<ID3D11Device>(&raw, "IDXGIDevice::GetAdapter").ok()?;
    let desc = unsafe {
        let adapter = device.cast::<IDXGIDevice>().ok()?.GetAdapter().ok()?;
        adapter.GetDesc().ok()?
    };
    let len = desc
        .Description
        .iter()
        .position(|c| *c == 0)
        .unwrap_or(desc.Description.len());
    Some(String::from_utf16_lossy(&desc.Description[..len]))
}

/// `ArraySize` of `texture`.
pub(crate) fn texture_array_size(texture: RawHandle) -> Option<u32> {
    let raw = texture.as_ptr::<c_void>();
    let texture = borrowed::<ID3D11Texture2D>(&raw, "ID3D11Texture2D::GetDesc").ok()?;
    let mut desc = D3D11_TEXTURE2D_DESC::default();
    unsafe { texture.GetDesc(&mut desc) };
    Some(desc.ArraySize)
}

fn dxgi_format(format: PixelFormat) -> Result<DXGI_FORMAT, HwContextError> {
    match format {
        PixelFormat::Nv12 => Ok(DXGI_FORMAT_NV12),
        PixelFormat::P010 => Ok(DXGI_FORMAT_P010),
        _ => Err(HwContextError::Unsupported("texture formats other than NV12 and P010")),
    }
}

pub(super) fn create_texture(
    device: RawHandle,
    desc: &TextureDesc,
) -> Result<D3d11Texture, HwContextError> {
    let raw = device.as_ptr::<c_void>();
    let device = borrowed::<ID3D11Device>(&raw, "ID3D11Device::CreateTexture2D")?;
    let texture_desc = D3D11_TEXTURE2D_DESC {
        Width: desc.width,
        Height: desc.height,
        MipLevels: 1,
        ArraySize: desc.array_size,
        Format: dxgi_format(desc.format)?,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: desc.bind_flags.bits(),
        CPUAccessFlags: 0,
        MiscFlags: desc.misc_flags.bits(),
    };

    let mut texture: Option<ID3D11Texture2D> = None;
    unsafe { device.CreateTexture2D(&texture_desc, None, Some(&mut texture)) }
        .map_err(|err| native_error("ID3D11Device::CreateTexture2D", err))?;
    texture
        .map(D3d11Texture)
        .ok_or(HwContextError::NullContext {
            operation: "ID3D11Device::CreateTexture2D",
        })
}

pub(super) fn copy_subresource(
    context: RawHandle,
    dst: RawHandle,
    dst_subresource: u32,
    src: RawHandle,
    src_subresource: u32,
) -> Result<(), HwContextError> {
    const OPERATION: &str = "ID3D11DeviceContext::CopySubresourceRegion";
    let (context, dst, src) = (
        context.as_ptr::<c_void>(),
        dst.as_ptr::<c_void>(),
        src.as_ptr::<c_void>(),
    );
    let context = borrowed::<ID3D11DeviceContext>(&context, OPERATION)?;
    let dst = borrowed::<ID3D11Resource>(&dst, OPERATION)?;
    let src = borrowed::<ID3D11Resource>(&src, OPERATION)?;

    unsafe {
        context.CopySubresourceRegion(dst, dst_subresource, 0, 0, 0, src, src_subresource, None);
    }
    Ok(())
}
