//! C ABI.
//!
//! ```c
//! typedef struct { uint8_t* tile; uint16_t tilelength; char first_dim; } Tile;
//!
//! void    init_grok(void);
//! void    deref_grok(void);
//! Tile*   load_single_tile(const char* fname, uint64_t x, uint64_t y,
//!                          uint16_t tile_size, uint8_t magnification);
//! Tile**  load_tiles(const char* fname, const uint64_t* xs, const uint64_t* ys,
//!                    uint16_t n_tiles, uint16_t tile_size, uint8_t magnification);
//! void    free_tile(Tile* tile);
//! void    free_tiles(Tile** tiles, uint16_t n_tiles);
//! int32_t tiff_sampler_last_error(char* buf, size_t len);
//! void    tiff_sampler_clear_error(void);
//! ```
//!
//! - Every entry point catches panics; none cross the boundary
//! - Failures return NULL and leave a message for `tiff_sampler_last_error`
//!   on the calling thread
//! - Tiles are owned by the caller until passed to `free_tile`/`free_tiles`
//!
//! Calls block on a process-wide tokio runtime, so they must not be made
//! from inside an async task. Sampler options come from `TIFF_SAMPLER_*`
//! environment variables, read once when the runtime starts.

use std::cell::RefCell;
use std::ffi::{c_char, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, OnceLock};

use tokio::runtime::Runtime;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::slide::LocalSlideSource;
use crate::tile::{tile_byte_len, SampleRequest, SamplerOptions, Tile, TileSampler};

/// Filter for logs emitted behind the C ABI, e.g. `tiff_sampler=debug`
pub const LOG_ENV: &str = "TIFF_SAMPLER_LOG";

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

// ============================================================================
// C ABI Types
// ============================================================================

/// A sampled tile handed to C.
///
/// `tile` points to `tilelength * tilelength * 3` bytes, height-first when
/// `first_dim` is `'H'` and channel-first when it is `'C'`.
#[repr(C)]
#[derive(Debug)]
pub struct CTile {
    pub tile: *mut u8,
    pub tilelength: u16,
    pub first_dim: c_char,
}

impl CTile {
    fn into_raw(tile: Tile) -> *mut CTile {
        let tilelength = tile.tile_length();
        let first_dim = tile.layout().as_char() as c_char;
        let data = Box::into_raw(tile.into_data().into_boxed_slice()) as *mut u8;
        Box::into_raw(Box::new(CTile {
            tile: data,
            tilelength,
            first_dim,
        }))
    }
}

// ============================================================================
// Shared sampler
// ============================================================================

struct SamplerState {
    runtime: Runtime,
    sampler: Arc<TileSampler<LocalSlideSource>>,
}

static STATE: OnceLock<Result<SamplerState, String>> = OnceLock::new();

fn state() -> Result<&'static SamplerState, String> {
    STATE
        .get_or_init(|| {
            init_logging();
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name("tiff-sampler")
                .build()
                .map_err(|e| format!("failed to start runtime: {}", e))?;
            let options = SamplerOptions::from_env();
            info!(?options, "tile sampler started");
            Ok(SamplerState {
                runtime,
                sampler: Arc::new(TileSampler::with_options(LocalSlideSource::new(), options)),
            })
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Log to stderr when `TIFF_SAMPLER_LOG` is set. The host process may have
/// installed a subscriber already; that one is kept.
fn init_logging() {
    if let Ok(filter) = std::env::var(LOG_ENV) {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(filter))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
    }
}

// ============================================================================
// Error Handling
// ============================================================================

fn set_last_error(message: String) {
    debug!(error = %message, "ffi call failed");
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = message;
    });
}

/// Run `f`, turning an error or a panic into `fallback` and a last-error
/// message.
fn guarded<T>(name: &str, fallback: T, f: impl FnOnce() -> Result<T, String>) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(message)) => {
            set_last_error(message);
            fallback
        }
        Err(_) => {
            set_last_error(format!("panic in {}", name));
            fallback
        }
    }
}

/// Copy the last error of this thread into `buf`, NUL-terminated and
/// truncated to `len - 1` bytes.
///
/// Returns the number of bytes copied, or -1 when `buf` is null or `len`
/// is 0.
///
/// # Safety
/// `buf` must point to at least `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn tiff_sampler_last_error(buf: *mut c_char, len: usize) -> i32 {
    if buf.is_null() || len == 0 {
        return -1;
    }

    LAST_ERROR.with(|e| {
        let message = e.borrow();
        let bytes = message.as_bytes();
        let copy_len = bytes.len().min(len - 1).min(i32::MAX as usize);
        ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, copy_len);
        *buf.add(copy_len) = 0;
        copy_len as i32
    })
}

#[no_mangle]
pub extern "C" fn tiff_sampler_clear_error() {
    LAST_ERROR.with(|e| e.borrow_mut().clear());
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Start the runtime and sampler. Optional, since the first load does it
/// too, and idempotent.
#[no_mangle]
pub extern "C" fn init_grok() {
    guarded("init_grok", (), || state().map(|_| ()));
}

/// Drop every cached slide and decoded tile.
#[no_mangle]
pub extern "C" fn deref_grok() {
    guarded("deref_grok", (), || {
        if let Some(Ok(state)) = STATE.get() {
            state.runtime.block_on(state.sampler.clear_caches());
        }
        Ok(())
    });
}

// ============================================================================
// Sampling
// ============================================================================

unsafe fn slide_path(fname: *const c_char) -> Result<String, String> {
    if fname.is_null() {
        return Err("slide path is null".to_string());
    }
    CStr::from_ptr(fname)
        .to_str()
        .map(str::to_string)
        .map_err(|_| "slide path is not valid UTF-8".to_string())
}

/// Sample one tile at base-level `(x, y)` and `magnification`.
///
/// Returns NULL on failure.
///
/// # Safety
/// `fname` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn load_single_tile(
    fname: *const c_char,
    x: u64,
    y: u64,
    tile_size: u16,
    magnification: u8,
) -> *mut CTile {
    guarded("load_single_tile", ptr::null_mut(), || {
        let path = slide_path(fname)?;
        let state = state()?;
        let request = SampleRequest::new(path, x, y, tile_size, magnification);
        let tile = state
            .runtime
            .block_on(state.sampler.sample(&request))
            .map_err(|e| e.to_string())?;
        Ok(CTile::into_raw(tile))
    })
}

/// Sample `n_tiles` tiles of one slide concurrently.
///
/// Returns an array of `n_tiles` pointers, NULL where that tile failed (the
/// last error names the first failure), or NULL when the arguments are
/// invalid. Release it with `free_tiles`.
///
/// # Safety
/// `fname` must be null or a NUL-terminated string; `xs` and `ys` must be
/// null or point to `n_tiles` values each.
#[no_mangle]
pub unsafe extern "C" fn load_tiles(
    fname: *const c_char,
    xs: *const u64,
    ys: *const u64,
    n_tiles: u16,
    tile_size: u16,
    magnification: u8,
) -> *mut *mut CTile {
    guarded("load_tiles", ptr::null_mut(), || {
        let path = slide_path(fname)?;
        if xs.is_null() || ys.is_null() {
            return Err("coordinate arrays must not be null".to_string());
        }
        if n_tiles == 0 {
            return Err("n_tiles must be greater than 0".to_string());
        }
        let xs = std::slice::from_raw_parts(xs, n_tiles as usize);
        let ys = std::slice::from_raw_parts(ys, n_tiles as usize);

        let state = state()?;
        let requests = xs
            .iter()
            .zip(ys)
            .map(|(&x, &y)| SampleRequest::new(path.as_str(), x, y, tile_size, magnification))
            .collect();
        let results = state.runtime.block_on(state.sampler.sample_many(requests));

        let mut first_error = None;
        let tiles: Box<[*mut CTile]> = results
            .into_iter()
            .map(|result| match result {
                Ok(tile) => CTile::into_raw(tile),
                Err(e) => {
                    first_error.get_or_insert_with(|| e.to_string());
                    ptr::null_mut()
                }
            })
            .collect();
        if let Some(message) = first_error {
            set_last_error(message);
        }
        Ok(Box::into_raw(tiles) as *mut *mut CTile)
    })
}

/// Release a tile from `load_single_tile`. NULL is ignored.
///
/// # Safety
/// `tile` must be null or a pointer returned by this library and not yet
/// freed.
#[no_mangle]
pub unsafe extern "C" fn free_tile(tile: *mut CTile) {
    if tile.is_null() {
        return;
    }
    let tile = Box::from_raw(tile);
    if !tile.tile.is_null() {
        let len = tile_byte_len(tile.tilelength);
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(tile.tile, len)));
    }
}

/// Release an array from `load_tiles` and every tile in it. NULL is ignored.
///
/// # Safety
/// `tiles` must be null or an array returned by `load_tiles` for the same
/// `n_tiles`, not yet freed.
#[no_mangle]
pub unsafe extern "C" fn free_tiles(tiles: *mut *mut CTile, n_tiles: u16) {
    if tiles.is_null() {
        return;
    }
    let tiles = Box::from_raw(ptr::slice_from_raw_parts_mut(tiles, n_tiles as usize));
    for &tile in tiles.iter() {
        free_tile(tile);
    }
}
