//! `ymm0` access primitives
//!
//! Three leaf operations: load 32 bytes into `ymm0`, store 32 bytes out of
//! it, and compare it against a pattern without disturbing it — plus
//! [`snapshot_ymm0`], the by-value capture the probes actually report with.
//! Everything interesting about the probes depends on the leaves not doing
//! anything else — no calls, no locals, no compiler-chosen vector
//! registers — so each leaf body is a bare asm block and nothing more.
//!
//! Everything is `#[target_feature(enable = "avx")]`. That makes the `ymm`
//! operands legal, and it keeps every *caller* compiled for baseline
//! x86-64. Callers still owe the register some care: the compiler may use
//! `xmm0` — the low half of `ymm0` — for its own array zeroing, copies, and
//! compares, so readbacks go through [`snapshot_ymm0`] (whose buffer has no
//! pre-read initialization to schedule) and wait-loop comparisons go
//! through [`ymm0_differs_from`] rather than `==` on the arrays. AVX
//! presence is a precondition of running the probes at all, not something
//! checked at runtime.
//!
//! Plain `vmovdqu` throughout. An earlier revision used a masked load (the
//! `_mm256_maskz_load_epi64` encoding) and took SIGILL on the `kmovw` that
//! sets up the mask register, on a machine that otherwise runs AVX fine.
//! TODO: understand the kmovw fault before reintroducing masked forms.

use core::arch::asm;
use core::mem::MaybeUninit;

/// The 32-byte register image: four 64-bit lanes, lane 0 lowest.
pub type RegWords = [u64; 4];

/// Load `words` into `ymm0`.
///
/// # Safety
///
/// Requires an AVX-capable CPU. Clobbers `ymm0` and nothing else; the
/// compiler is told about the clobber.
#[target_feature(enable = "avx")]
pub unsafe fn write_ymm0(words: &RegWords) {
    asm!(
        "vmovdqu ymm0, [{src}]",
        src = in(reg) words.as_ptr(),
        out("ymm0") _,
        options(nostack, readonly, preserves_flags),
    );
}

/// Copy the current contents of `ymm0` into `out`, without modifying it.
///
/// The compiler is deliberately told nothing about `ymm0` here: the whole
/// point is to observe whatever the hardware currently holds, whether or
/// not any code this compiler emitted put it there. The out-pointer form
/// keeps the function free of locals whose initialization or return copy
/// could touch the register first.
///
/// # Safety
///
/// Requires an AVX-capable CPU; `out` must be valid for a 32-byte write.
#[target_feature(enable = "avx")]
pub unsafe fn read_ymm0(out: *mut RegWords) {
    asm!(
        "vmovdqu [{dst}], ymm0",
        dst = in(reg) out,
        options(nostack, preserves_flags),
    );
}

/// Capture `ymm0` by value.
///
/// The backing buffer is never initialized before the store, so no
/// compiler-generated zeroing can touch the register first; the copy out
/// happens only after the register has been captured. Callers that need
/// `ymm0` to stay intact *after* the call must re-arm it themselves — the
/// returning copy is ordinary code and free to use the vector unit.
///
/// # Safety
///
/// Requires an AVX-capable CPU.
#[target_feature(enable = "avx")]
pub unsafe fn snapshot_ymm0() -> RegWords {
    let mut words = MaybeUninit::<RegWords>::uninit();
    read_ymm0(words.as_mut_ptr());
    words.assume_init()
}

/// Whether `ymm0` currently differs from `expected`, computed without
/// touching `ymm0` and without any compiler-visible 32-byte compare (which
/// would be free to use `xmm0` and corrupt the register under test). The
/// scratch register is `ymm1`, which is not under test.
///
/// # Safety
///
/// Requires an AVX-capable CPU.
#[target_feature(enable = "avx")]
pub unsafe fn ymm0_differs_from(expected: &RegWords) -> bool {
    let differs: u8;
    asm!(
        "vxorps ymm1, ymm0, [{exp}]",
        "vptest ymm1, ymm1",
        "setnz {d}",
        exp = in(reg) expected.as_ptr(),
        d = out(reg_byte) differs,
        out("ymm1") _,
        options(nostack, readonly),
    );
    differs != 0
}
