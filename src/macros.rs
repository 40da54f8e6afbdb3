//! Internal helper macros.

/// Writes a whole buffer to a nonblocking socket, waiting for write
/// readiness whenever the kernel buffer is full.
///
/// Works for any socket exposing `writable()` and `try_write()`
/// (TCP, Unix stream, FIFO sender). Expands to an `io::Result<()>` and must
/// be used inside an `async` function.
macro_rules! write_all_ready {
    ($stream:expr, $data:expr) => {{
        let stream = $stream;
        let data: &[u8] = $data;
        let mut written = 0usize;
        let mut outcome: ::std::io::Result<()> = Ok(());
        while written < data.len() {
            if let Err(e) = stream.writable().await {
                outcome = Err(e);
                break;
            }
            match stream.try_write(&data[written..]) {
                Ok(0) => {
                    outcome = Err(::std::io::Error::from(::std::io::ErrorKind::WriteZero));
                    break;
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ::std::io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        outcome
    }};
}
