use can_sequence::{
    CanId, FrameRx, FrameTx, IdFilter, RxError, RxMeta, SeqFrame, TxError, MAX_DLC,
};
use core::time::Duration;
use embedded_can::Frame;
use socketcan::{CanFilter, CanFrame, CanSocket, Socket, SocketOptions};
use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Raw SocketCAN endpoint bound to one interface.
#[derive(Debug)]
pub struct SocketCanEndpoint {
    inner: CanSocket,
    overflow_metadata: bool,
}

impl SocketCanEndpoint {
    /// Open and bind a raw CAN socket on `iface` (e.g. `"can0"`).
    ///
    /// Fails if the interface name cannot be resolved. The socket starts with a drop-all
    /// receive filter; call [`Self::install_filter`] before receiving.
    pub fn open(iface: &str) -> io::Result<Self> {
        let inner = CanSocket::open(iface)?;
        inner.set_filter_drop_all()?;
        Ok(Self {
            inner,
            overflow_metadata: false,
        })
    }

    /// Admit only frames matching `filter`.
    pub fn install_filter(&mut self, filter: &IdFilter) -> io::Result<()> {
        self.inner.set_filters(&[to_socketcan_filter(filter)])
    }

    /// Ask the kernel to attach receive timestamps and the socket overflow counter to each
    /// received frame.
    ///
    /// Missing support is not an error: a warning is logged and overflows read as 0. Returns
    /// whether overflow reporting is active.
    pub fn enable_rx_metadata(&mut self) -> bool {
        let fd = self.as_raw_fd();
        if let Err(err) = enable_socket_flag(fd, libc::SO_TIMESTAMP) {
            log::warn!("SO_TIMESTAMP not supported: {err}");
        }
        match enable_socket_flag(fd, libc::SO_RXQ_OVFL) {
            Ok(()) => self.overflow_metadata = true,
            Err(err) => {
                log::warn!(
                    "SO_RXQ_OVFL not supported by this kernel ({err}); socket overflows will read as 0"
                );
                self.overflow_metadata = false;
            }
        }
        self.overflow_metadata
    }

    /// Whether overflow counters are delivered with received frames.
    pub fn has_overflow_metadata(&self) -> bool {
        self.overflow_metadata
    }

    /// Borrow the inner SocketCAN socket.
    pub fn as_inner(&self) -> &CanSocket {
        &self.inner
    }
}

impl AsRawFd for SocketCanEndpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

fn enable_socket_flag(fd: RawFd, option: libc::c_int) -> io::Result<()> {
    let on: libc::c_int = 1;
    // SAFETY: `on` outlives the call and the passed length matches its size.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            &on as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn to_socketcan_filter(f: &IdFilter) -> CanFilter {
    let (id, mask) = raw_filter(f);
    CanFilter::new(id, mask)
}

fn raw_filter(f: &IdFilter) -> (u32, u32) {
    // Raw filters compare `received_id & mask == filter_id & mask` where IDs include the EFF flag.
    // Keep EFF in the mask so only the configured frame format matches.
    let eff = libc::CAN_EFF_FLAG as u32;
    if f.id.is_extended() {
        (f.id.raw() | eff, (f.mask & can_sequence::EFF_MASK) | eff)
    } else {
        (f.id.raw(), (f.mask & can_sequence::SFF_MASK) | eff)
    }
}

fn wait_for_writable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    // SAFETY: `fds` is a single valid pollfd for the duration of the call.
    let res = unsafe { libc::poll(&mut fds, 1, millis) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(res > 0)
}

/// Kernel `struct can_frame` layout.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct RawCanFrame {
    can_id: u32,
    len: u8,
    pad: u8,
    res0: u8,
    len8_dlc: u8,
    data: [u8; MAX_DLC],
}

impl RawCanFrame {
    fn to_seq_frame(self) -> SeqFrame {
        let extended = self.can_id & libc::CAN_EFF_FLAG as u32 != 0;
        let remote = self.can_id & libc::CAN_RTR_FLAG as u32 != 0;
        SeqFrame::from_parts(CanId::new(self.can_id, extended), self.len, self.data, remote)
    }
}

fn timeval_to_system_time(tv: libc::timeval) -> Option<SystemTime> {
    if tv.tv_sec < 0 || tv.tv_usec < 0 {
        return None;
    }
    let since_epoch = Duration::new(tv.tv_sec as u64, (tv.tv_usec as u32).saturating_mul(1000));
    UNIX_EPOCH.checked_add(since_epoch)
}

/// `recvmsg(2)` one classic frame plus its `SOL_SOCKET` control messages.
fn recv_with_meta(fd: RawFd) -> io::Result<(RawCanFrame, RxMeta)> {
    let mut raw = RawCanFrame::default();
    // Room for a timeval and a u32 control message, 8-byte aligned.
    let mut control = [0u64; 8];

    let mut iov = libc::iovec {
        iov_base: &mut raw as *mut RawCanFrame as *mut libc::c_void,
        iov_len: mem::size_of::<RawCanFrame>(),
    };
    // SAFETY: `msghdr` is plain data; all-zero is a valid empty header.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = mem::size_of_val(&control) as _;

    // SAFETY: `msg` points at `iov` (covering `raw`) and `control`, all live across the call with
    // lengths matching their sizes.
    let nbytes = unsafe { libc::recvmsg(fd, &mut msg, 0) };
    if nbytes < 0 {
        return Err(io::Error::last_os_error());
    }
    if (nbytes as usize) < mem::size_of::<RawCanFrame>() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "incomplete CAN frame",
        ));
    }

    let mut meta = RxMeta::default();
    // SAFETY: `msg` was filled by the kernel; the CMSG_* helpers stay within `control`.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            let hdr = &*cmsg;
            if hdr.cmsg_level == libc::SOL_SOCKET {
                if hdr.cmsg_type == libc::SO_RXQ_OVFL {
                    let overflows = ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const u32);
                    meta.overflows = Some(overflows);
                } else if hdr.cmsg_type == libc::SO_TIMESTAMP {
                    let tv = ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const libc::timeval);
                    meta.timestamp = timeval_to_system_time(tv);
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }
    Ok((raw, meta))
}

impl FrameTx for SocketCanEndpoint {
    fn send(&mut self, frame: &SeqFrame) -> Result<(), TxError> {
        let out = <CanFrame as Frame>::new(frame.id(), frame.data()).ok_or_else(|| {
            TxError::Link(io::Error::new(
                io::ErrorKind::InvalidInput,
                "frame does not fit a classic CAN frame",
            ))
        })?;
        self.inner.write_frame(&out).map_err(TxError::from)
    }

    fn wait_writable(&mut self, timeout: Duration) -> Result<bool, TxError> {
        wait_for_writable(self.as_raw_fd(), timeout).map_err(TxError::from)
    }
}

impl FrameRx for SocketCanEndpoint {
    fn recv(&mut self) -> Result<(SeqFrame, RxMeta), RxError> {
        let (raw, meta) = recv_with_meta(self.as_raw_fd()).map_err(RxError::from)?;
        Ok((raw.to_seq_frame(), meta))
    }
}
