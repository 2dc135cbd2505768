//! Editing the `ymm0` slot of a saved signal frame
//!
//! On Linux a handler's write to the live register does not survive its own
//! return: `rt_sigreturn` restores the interrupted context's extended state
//! from the frame the kernel saved on the user stack. A handler that wants
//! its overwrite to be visible to the interrupted flow has to edit the state
//! the kernel will restore, not just the register — which is why the probes
//! install their handlers with `SA_SIGINFO` and get handed the `ucontext`.
//!
//! Frame layout, as the kernel builds it for an AVX-capable CPU:
//!
//! - bytes 0..512: the legacy FXSAVE image (`xmm0` at byte 160);
//! - bytes 464..512 of that image: the kernel's software-reserved block,
//!   `magic1 == FP_XSTATE_MAGIC1` when an extended area follows;
//! - bytes 512..576: the xstate header (`xstate_bv` first);
//! - bytes 576..: the `YMM_Hi128` component, 16 bytes per register.

use crate::register::RegWords;

/// Size of the legacy FXSAVE image; the xstate header follows it directly.
const FXSAVE_BYTES: usize = 512;
/// Offset of the `xmm0` slot inside the FXSAVE image.
const XMM0_OFF: usize = 160;
/// Offset of the software-reserved block inside the FXSAVE image.
const SW_BYTES_OFF: usize = 464;
/// "FPXS": the kernel stored an extended (xstate) frame.
const FP_XSTATE_MAGIC1: u32 = 0x4650_5853;
/// Offset of `xstate_bv`, the component bitmap consumed by the restore.
const XSTATE_BV_OFF: usize = FXSAVE_BYTES;
/// Offset of the `YMM_Hi128` component in the standard xstate layout.
const YMMH_OFF: usize = 576;
/// `xstate_bv` bits that must be set for `xmm0`/`ymm0` to be restored
/// rather than re-initialized.
const XFEATURE_SSE: u64 = 1 << 1;
const XFEATURE_YMM: u64 = 1 << 2;

/// Write `words` into the `ymm0` slot of the saved frame behind `uc`, so
/// that the value is what `sigreturn` restores into the interrupted flow.
///
/// Returns `true` when all 256 bits were reachable. A frame without an
/// extended area (no xstate magic) only exposes the low 128 bits; those are
/// still edited, and `false` is returned. A null context or a frame without
/// FPU state is left alone.
///
/// # Safety
///
/// `uc` must be the `ucontext` pointer passed to an `SA_SIGINFO` handler by
/// the kernel (or a test fixture laid out the same way), and must not be
/// aliased concurrently.
pub unsafe fn clobber_saved_ymm0(uc: *mut libc::ucontext_t, words: &RegWords) -> bool {
    if uc.is_null() {
        return false;
    }
    let fpregs = (*uc).uc_mcontext.fpregs;
    if fpregs.is_null() {
        return false;
    }

    // Low 128 bits live in the legacy xmm0 slot.
    let xmm0 = &mut (*fpregs)._xmm[0];
    xmm0.element[0] = words[0] as u32;
    xmm0.element[1] = (words[0] >> 32) as u32;
    xmm0.element[2] = words[1] as u32;
    xmm0.element[3] = (words[1] >> 32) as u32;

    let base = fpregs as *mut u8;
    let magic1 = *(base.add(SW_BYTES_OFF) as *const u32);
    if magic1 != FP_XSTATE_MAGIC1 {
        // Legacy frame: there are no ymm high halves to edit.
        return false;
    }

    // High 128 bits live in the YMM_Hi128 component of the xstate area.
    let ymmh = base.add(YMMH_OFF) as *mut u64;
    *ymmh = words[2];
    *ymmh.add(1) = words[3];

    // Keep the restore from re-initializing the components just written.
    let bv = base.add(XSTATE_BV_OFF) as *mut u64;
    *bv |= XFEATURE_SSE | XFEATURE_YMM;

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    // Big enough for the FXSAVE image, the xstate header, and ymm0's high
    // half; aligned like the real frame.
    #[repr(align(64))]
    struct FrameBuf([u8; 1024]);

    fn read_u64(buf: &FrameBuf, off: usize) -> u64 {
        u64::from_le_bytes(buf.0[off..off + 8].try_into().unwrap())
    }

    fn context_over(buf: &mut FrameBuf) -> libc::ucontext_t {
        let mut uc: libc::ucontext_t = unsafe { std::mem::zeroed() };
        uc.uc_mcontext.fpregs = buf.0.as_mut_ptr() as *mut libc::_libc_fpstate;
        uc
    }

    #[test]
    fn extended_frame_gets_all_four_lanes() {
        let mut buf = FrameBuf([0; 1024]);
        buf.0[SW_BYTES_OFF..SW_BYTES_OFF + 4].copy_from_slice(&FP_XSTATE_MAGIC1.to_le_bytes());
        let mut uc = context_over(&mut buf);

        let full = unsafe { clobber_saved_ymm0(&mut uc, &[0x5, 0x6, 0x7, 0x8]) };

        assert!(full);
        assert_eq!(read_u64(&buf, XMM0_OFF), 0x5);
        assert_eq!(read_u64(&buf, XMM0_OFF + 8), 0x6);
        assert_eq!(read_u64(&buf, YMMH_OFF), 0x7);
        assert_eq!(read_u64(&buf, YMMH_OFF + 8), 0x8);
        assert_eq!(
            read_u64(&buf, XSTATE_BV_OFF) & (XFEATURE_SSE | XFEATURE_YMM),
            XFEATURE_SSE | XFEATURE_YMM
        );
    }

    #[test]
    fn legacy_frame_only_edits_low_lanes() {
        let mut buf = FrameBuf([0; 1024]);
        let mut uc = context_over(&mut buf);

        let full = unsafe { clobber_saved_ymm0(&mut uc, &[0x5, 0x6, 0x7, 0x8]) };

        assert!(!full);
        assert_eq!(read_u64(&buf, XMM0_OFF), 0x5);
        assert_eq!(read_u64(&buf, XMM0_OFF + 8), 0x6);
        assert_eq!(read_u64(&buf, YMMH_OFF), 0);
        assert_eq!(read_u64(&buf, XSTATE_BV_OFF), 0);
    }

    #[test]
    fn missing_fpu_state_is_left_alone() {
        let mut uc: libc::ucontext_t = unsafe { std::mem::zeroed() };
        assert!(!unsafe { clobber_saved_ymm0(&mut uc, &[0x5, 0x6, 0x7, 0x8]) });
        assert!(!unsafe { clobber_saved_ymm0(std::ptr::null_mut(), &[0x5, 0x6, 0x7, 0x8]) });
    }
}
