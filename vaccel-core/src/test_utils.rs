use std::{
    cell::RefCell,
    collections::HashMap,
    io,
    rc::Rc,
    sync::{Arc, Mutex},
};

use tracing_subscriber::fmt::MakeWriter;

use crate::{
    catalog::{CodecId, HwDeviceType, PixelFormat},
    codec::{CodecCategory, CodecInfo, CodecRegistry, HwConfig, HwConfigMethods},
    compute::{ComputeApi, ComputeError, ContextProperty, FrameSize},
    device::DeviceContext,
    frames::{FramesParams, FramesPool},
    hwcontext::{
        DeviceCapability, HwContextApi, HwContextError, NativeDevice, NativeHandle,
        NativeTexture, RawHandle, TextureDesc,
    },
    interop::{NativeFrame, NativeSurface},
    negotiate::HwCodecContext,
};

#[derive(Debug, Default)]
struct HwState {
    devices: HashMap<HwDeviceType, Option<String>>,
    capabilities: Vec<DeviceCapability>,
    fail_frames_alloc: bool,
    fail_frames_init: bool,
    fail_derive: bool,
    failing_creates: usize,
    next_handle: usize,
    create_calls: Vec<(HwDeviceType, Option<String>)>,
    wrap_calls: Vec<(HwDeviceType, RawHandle)>,
    released: Vec<HwDeviceType>,
    initialized_frames: Vec<FramesParams>,
    created_textures: usize,
    released_textures: usize,
    subresource_copies: Vec<(RawHandle, u32, RawHandle, u32)>,
}

impl HwState {
    fn next_handle(&mut self) -> RawHandle {
        self.next_handle += 0x100;
        RawHandle::new(0x1000 + self.next_handle)
    }
}

/// In-memory hwcontext runtime. Only device types registered with
/// [`FakeHwContext::with_device`] can be created.
#[derive(Debug, Clone, Default)]
pub struct FakeHwContext {
    state: Rc<RefCell<HwState>>,
}

impl FakeHwContext {
    pub fn with_device(self, device_type: HwDeviceType, description: Option<&str>) -> Self {
        self.state
            .borrow_mut()
            .devices
            .insert(device_type, description.map(str::to_owned));
        self
    }

    pub fn with_capability(self, capability: DeviceCapability) -> Self {
        self.state.borrow_mut().capabilities.push(capability);
        self
    }

    pub fn fail_frames_alloc(self) -> Self {
        self.state.borrow_mut().fail_frames_alloc = true;
        self
    }

    pub fn fail_frames_init(self) -> Self {
        self.state.borrow_mut().fail_frames_init = true;
        self
    }

    /// Makes the next `count` device creations fail.
    pub fn fail_creates(self, count: usize) -> Self {
        self.state.borrow_mut().failing_creates = count;
        self
    }

    pub fn fail_derive(self) -> Self {
        self.state.borrow_mut().fail_derive = true;
        self
    }

    pub fn create_calls(&self) -> Vec<(HwDeviceType, Option<String>)> {
        self.state.borrow().create_calls.clone()
    }

    pub fn wrap_calls(&self) -> Vec<(HwDeviceType, RawHandle)> {
        self.state.borrow().wrap_calls.clone()
    }

    /// Device types in the order their native objects were released.
    pub fn released(&self) -> Vec<HwDeviceType> {
        self.state.borrow().released.clone()
    }

    pub fn initialized_frames(&self) -> Vec<FramesParams> {
        self.state.borrow().initialized_frames.clone()
    }

    pub fn created_textures(&self) -> usize {
        self.state.borrow().created_textures
    }

    pub fn released_textures(&self) -> usize {
        self.state.borrow().released_textures
    }

    pub fn subresource_copies(&self) -> Vec<(RawHandle, u32, RawHandle, u32)> {
        self.state.borrow().subresource_copies.clone()
    }

    pub fn device_context(&self, device_type: HwDeviceType) -> DeviceContext<FakeDevice> {
        DeviceContext::new(device_type, self.create_device(device_type, None).unwrap())
    }

    pub fn derived_context(
        &self,
        device_type: HwDeviceType,
        base_type: HwDeviceType,
    ) -> DeviceContext<FakeDevice> {
        let base = self.device_context(base_type);
        let native = self.derive_device(device_type, base.native()).unwrap();
        DeviceContext::derived(device_type, native, base)
    }

    fn device(&self, device_type: HwDeviceType, handle: NativeHandle) -> FakeDevice {
        let state = self.state.borrow();
        FakeDevice {
            device_type,
            handle,
            description: state.devices.get(&device_type).cloned().flatten(),
            capabilities: state.capabilities.clone(),
            state: self.state.clone(),
        }
    }
}

fn native_error(operation: &'static str) -> HwContextError {
    HwContextError::Native {
        operation,
        code: -22,
    }
}

impl HwContextApi for FakeHwContext {
    type Device = FakeDevice;
    type Frames = FakeFrames;
    type Texture = FakeTexture;

    fn create_device(
        &self,
        device_type: HwDeviceType,
        path: Option<&str>,
    ) -> Result<FakeDevice, HwContextError> {
        let handle = {
            let mut state = self.state.borrow_mut();
            state
                .create_calls
                .push((device_type, path.map(str::to_owned)));
            if state.failing_creates > 0 {
                state.failing_creates -= 1;
                return Err(native_error("create_device"));
            }
            if !state.devices.contains_key(&device_type) {
                return Err(native_error("create_device"));
            }
            let raw = state.next_handle();
            match device_type {
                HwDeviceType::Vaapi => NativeHandle::VaDisplay(raw),
                HwDeviceType::D3d11va => NativeHandle::D3d11 {
                    device: raw,
                    context: RawHandle::new(raw.get() + 1),
                },
                HwDeviceType::Qsv => NativeHandle::MfxSession(raw),
                HwDeviceType::None => return Err(HwContextError::UnsupportedDeviceType(device_type)),
            }
        };
        Ok(self.device(device_type, handle))
    }

    fn wrap_device(
        &self,
        device_type: HwDeviceType,
        handle: RawHandle,
    ) -> Result<FakeDevice, HwContextError> {
        self.state.borrow_mut().wrap_calls.push((device_type, handle));
        let handle = match device_type {
            HwDeviceType::Vaapi => NativeHandle::VaDisplay(handle),
            HwDeviceType::D3d11va => NativeHandle::D3d11 {
                device: handle,
                context: RawHandle::NULL,
            },
            _ => return Err(HwContextError::UnsupportedDeviceType(device_type)),
        };
        Ok(self.device(device_type, handle))
    }

    fn derive_device(
        &self,
        device_type: HwDeviceType,
        base: &FakeDevice,
    ) -> Result<FakeDevice, HwContextError> {
        let raw = {
            let mut state = self.state.borrow_mut();
            if state.fail_derive {
                return Err(native_error("derive_device"));
            }
            state.next_handle()
        };
        Ok(FakeDevice {
            device_type,
            handle: NativeHandle::MfxSession(raw),
            description: None,
            capabilities: base.capabilities.clone(),
            state: self.state.clone(),
        })
    }

    fn alloc_frames(&self, device: &FakeDevice) -> Result<FakeFrames, HwContextError> {
        if self.state.borrow().fail_frames_alloc {
            return Err(native_error("alloc_frames"));
        }
        Ok(FakeFrames {
            device_type: device.device_type,
            derived_format: None,
            params: None,
        })
    }

    fn init_frames(
        &self,
        frames: &mut FakeFrames,
        params: &FramesParams,
    ) -> Result<(), HwContextError> {
        let mut state = self.state.borrow_mut();
        if state.fail_frames_init {
            return Err(native_error("init_frames"));
        }
        state.initialized_frames.push(*params);
        frames.params = Some(*params);
        Ok(())
    }

    fn derive_frames(
        &self,
        device: &FakeDevice,
        base: &FakeFrames,
        format: PixelFormat,
    ) -> Result<FakeFrames, HwContextError> {
        if self.state.borrow().fail_derive {
            return Err(native_error("derive_frames"));
        }
        Ok(FakeFrames {
            device_type: device.device_type,
            derived_format: Some(format),
            params: base.params,
        })
    }

    fn create_texture(
        &self,
        _device: &FakeDevice,
        desc: &TextureDesc,
    ) -> Result<FakeTexture, HwContextError> {
        let mut state = self.state.borrow_mut();
        state.created_textures += 1;
        Ok(FakeTexture {
            raw: state.next_handle(),
            desc: *desc,
            state: self.state.clone(),
        })
    }

    fn copy_subresource(
        &self,
        _device: &FakeDevice,
        dst: RawHandle,
        dst_subresource: u32,
        src: RawHandle,
        src_subresource: u32,
    ) -> Result<(), HwContextError> {
        self.state
            .borrow_mut()
            .subresource_copies
            .push((dst, dst_subresource, src, src_subresource));
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeDevice {
    pub device_type: HwDeviceType,
    handle: NativeHandle,
    description: Option<String>,
    capabilities: Vec<DeviceCapability>,
    state: Rc<RefCell<HwState>>,
}

impl NativeDevice for FakeDevice {
    fn handle(&self) -> NativeHandle {
        self.handle
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }

    fn has_capability(&self, capability: DeviceCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.state.borrow_mut().released.push(self.device_type);
    }
}

#[derive(Debug)]
pub struct FakeFrames {
    pub device_type: HwDeviceType,
    pub derived_format: Option<PixelFormat>,
    pub params: Option<FramesParams>,
}

#[derive(Debug)]
pub struct FakeTexture {
    raw: RawHandle,
    pub desc: TextureDesc,
    state: Rc<RefCell<HwState>>,
}

impl NativeTexture for FakeTexture {
    fn raw(&self) -> RawHandle {
        self.raw
    }
}

impl Drop for FakeTexture {
    fn drop(&mut self) {
        self.state.borrow_mut().released_textures += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    FromVaSurface { display: RawHandle, surface: u32 },
    ToVaSurface { display: RawHandle, surface: u32 },
    FromD3d11Texture(RawHandle),
    ToD3d11Texture(RawHandle),
}

#[derive(Debug, Default)]
struct ComputeState {
    unavailable: bool,
    contexts: Vec<ContextProperty>,
    conversions: Vec<Conversion>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeCompute {
    state: Rc<RefCell<ComputeState>>,
}

impl FakeCompute {
    pub fn unavailable() -> Self {
        let compute = Self::default();
        compute.state.borrow_mut().unavailable = true;
        compute
    }

    /// Sharing properties of every context created through this runtime.
    pub fn contexts(&self) -> Vec<ContextProperty> {
        self.state.borrow().contexts.clone()
    }

    pub fn conversions(&self) -> Vec<Conversion> {
        self.state.borrow().conversions.clone()
    }

    fn record(&self, conversion: Conversion) {
        self.state.borrow_mut().conversions.push(conversion);
    }
}

#[derive(Debug, Default)]
pub struct FakeImage {
    pub written: bool,
}

impl ComputeApi for FakeCompute {
    type Image = FakeImage;

    fn is_available(&self) -> bool {
        !self.state.borrow().unavailable
    }

    fn create_context(&self, sharing: ContextProperty) -> Result<String, ComputeError> {
        self.state.borrow_mut().contexts.push(sharing);
        Ok("Fake GPU".to_owned())
    }

    fn convert_from_va_surface(
        &self,
        display: RawHandle,
        surface: u32,
        _size: FrameSize,
        dst: &mut FakeImage,
    ) -> Result<(), ComputeError> {
        self.record(Conversion::FromVaSurface { display, surface });
        dst.written = true;
        Ok(())
    }

    fn convert_to_va_surface(
        &self,
        display: RawHandle,
        _src: &FakeImage,
        surface: u32,
        _size: FrameSize,
    ) -> Result<(), ComputeError> {
        self.record(Conversion::ToVaSurface { display, surface });
        Ok(())
    }

    fn convert_from_d3d11_texture(
        &self,
        texture: RawHandle,
        dst: &mut FakeImage,
    ) -> Result<(), ComputeError> {
        self.record(Conversion::FromD3d11Texture(texture));
        dst.written = true;
        Ok(())
    }

    fn convert_to_d3d11_texture(
        &self,
        _src: &FakeImage,
        texture: RawHandle,
    ) -> Result<(), ComputeError> {
        self.record(Conversion::ToD3d11Texture(texture));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FakeFrame {
    surface: NativeSurface,
}

impl FakeFrame {
    pub fn new(surface: NativeSurface) -> Self {
        Self { surface }
    }
}

impl NativeFrame for FakeFrame {
    fn size(&self) -> FrameSize {
        FrameSize {
            width: 1920,
            height: 1080,
        }
    }

    fn surface(&self) -> Option<NativeSurface> {
        Some(self.surface)
    }
}

#[derive(Debug, Default)]
pub struct FakeCodecRegistry {
    codecs: Vec<CodecInfo<usize>>,
}

impl FakeCodecRegistry {
    pub fn with_codec(
        mut self,
        name: &str,
        id: CodecId,
        category: CodecCategory,
        configure: impl FnOnce(&mut CodecInfo<usize>),
    ) -> Self {
        let mut codec = CodecInfo {
            handle: self.codecs.len(),
            name: name.to_owned(),
            id,
            category,
            experimental: false,
            pixel_formats: vec![],
            hw_configs: vec![],
        };
        configure(&mut codec);
        self.codecs.push(codec);
        self
    }
}

impl CodecRegistry for FakeCodecRegistry {
    type Handle = usize;

    fn codecs(&self) -> impl Iterator<Item = CodecInfo<usize>> + '_ {
        self.codecs.iter().cloned()
    }
}

pub fn hw_config(
    device_type: HwDeviceType,
    pix_fmt: PixelFormat,
    device_ctx: bool,
    frames_ctx: bool,
) -> HwConfig {
    HwConfig {
        device_type,
        pix_fmt,
        methods: HwConfigMethods {
            device_ctx,
            frames_ctx,
            internal: false,
        },
    }
}

pub struct FakeCodecContext {
    pub device: Option<DeviceContext<FakeDevice>>,
    pub hw_configs: Vec<HwConfig>,
    pub sw_format: PixelFormat,
    pub pool: Option<FramesPool<FakeHwContext>>,
}

impl FakeCodecContext {
    pub fn new(device: Option<DeviceContext<FakeDevice>>, hw_configs: Vec<HwConfig>) -> Self {
        Self {
            device,
            hw_configs,
            sw_format: PixelFormat::None,
            pool: None,
        }
    }
}

impl HwCodecContext<FakeHwContext> for FakeCodecContext {
    fn device(&self) -> Option<&DeviceContext<FakeDevice>> {
        self.device.as_ref()
    }

    fn hw_configs(&self) -> &[HwConfig] {
        &self.hw_configs
    }

    fn dimensions(&self) -> (u32, u32) {
        (1920, 1080)
    }

    fn frames_defaults(
        &self,
        _device: &DeviceContext<FakeDevice>,
        _format: PixelFormat,
    ) -> Option<FramesParams> {
        None
    }

    fn set_sw_format(&mut self, format: PixelFormat) {
        self.sw_format = format;
    }

    fn attach_frames(&mut self, pool: FramesPool<FakeHwContext>) {
        self.pool = Some(pool);
    }

    fn detach_device(&mut self) {
        self.device = None;
    }
}

/// Shared buffer collecting formatted log lines.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with a subscriber capturing everything logged on this thread.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, buffer.contents())
}
