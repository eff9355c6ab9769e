// THEORY:
// Thin wrappers over the Linux tty calls the serial link needs. The device
// node is opened with O_NONBLOCK so neither reads nor writes can park the
// calling thread, and the line is put into raw 8N1 mode at the requested
// speed through the termios2 ioctls. termios2 takes the speed as a plain
// integer (BOTHER), which is what non-standard rates like 250000 need.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Largest accepted deviation between requested and granted line speed.
const MAX_SPEED_ERROR: f64 = 0.03;

pub fn open_nonblocking(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
        .open(path)
}

pub fn line_settings(port: &File) -> io::Result<libc::termios2> {
    // SAFETY: termios2 is plain old data, all-zero is a valid value.
    let mut settings: libc::termios2 = unsafe { std::mem::zeroed() };
    // SAFETY: the fd is owned by `port` and stays open for the call; the
    // kernel writes at most size_of::<termios2>() bytes into `settings`.
    if unsafe { libc::ioctl(port.as_raw_fd(), libc::TCGETS2, &mut settings) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(settings)
}

/// Puts the line into raw 8N1 mode at `baud_rate`. Fails if the device is not
/// a tty or the driver grants a speed too far from the one requested.
pub fn configure_raw(port: &File, baud_rate: u32) -> io::Result<()> {
    let mut settings = line_settings(port)?;

    settings.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF);
    settings.c_oflag &= !libc::OPOST;
    settings.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    settings.c_cflag &= !(libc::CSIZE | libc::PARENB | libc::CSTOPB | libc::CBAUD);
    settings.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD | libc::BOTHER;
    settings.c_ispeed = baud_rate;
    settings.c_ospeed = baud_rate;
    settings.c_cc[libc::VMIN] = 0;
    settings.c_cc[libc::VTIME] = 0;

    // SAFETY: as in `line_settings`; the kernel only reads `settings`.
    if unsafe { libc::ioctl(port.as_raw_fd(), libc::TCSETS2, &settings) } == -1 {
        return Err(io::Error::last_os_error());
    }

    let granted = line_settings(port)?.c_ospeed;
    let error = (f64::from(granted) - f64::from(baud_rate)).abs() / f64::from(baud_rate.max(1));
    if granted == 0 || error > MAX_SPEED_ERROR {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("requested {baud_rate} baud, device granted {granted}"),
        ));
    }
    Ok(())
}
