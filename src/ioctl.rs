// ioctl() request codes are bit mapped as [dir:2][size:14][type:8][nr:8],
// based on asm-generic/ioctl.h.

#[cfg(target_env = "musl")]
pub type IoctlLong = libc::c_int;
#[cfg(not(target_env = "musl"))]
pub type IoctlLong = libc::c_ulong;

const NRBITS: u32 = 8;
const TYPEBITS: u32 = 8;
const SIZEBITS: u32 = 14;

const NRSHIFT: u32 = 0;
const TYPESHIFT: u32 = NRSHIFT + NRBITS;
const SIZESHIFT: u32 = TYPESHIFT + TYPEBITS;
const DIRSHIFT: u32 = SIZESHIFT + SIZEBITS;

const SIZE_MASK: u32 = (1 << SIZEBITS) - 1;

pub(crate) const DIR_WRITE: u32 = 1;
pub(crate) const DIR_READ: u32 = 2;

/// Encodes an ioctl() request code.
///
/// Computed in 32 bits and then widened, so requests with the read
/// direction bit set don't overflow a signed `IoctlLong`.
pub(crate) const fn request(dir: u32, kind: u8, nr: u8, size: usize) -> IoctlLong {
    ((dir << DIRSHIFT)
        | (((size as u32) & SIZE_MASK) << SIZESHIFT)
        | ((kind as u32) << TYPESHIFT)
        | ((nr as u32) << NRSHIFT)) as IoctlLong
}
