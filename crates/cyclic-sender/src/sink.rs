//! 发送回调与 UDP 发送端

use crate::frame::SendContext;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use tracing::debug;

/// 发送回调
///
/// 返回值 `< 0` 表示发送失败。回调在发送器的定时器线程上执行，
/// 执行期间持有帧表读锁：除 `stop()` 之外不要在回调里调用同一发送器的接口。
pub type Sink = Arc<dyn Fn(&[u8], &SendContext) -> i32 + Send + Sync>;

/// UDP 发送端
///
/// 把发送回调落到一个已连接的 UDP socket 上，用于台架工具。
#[derive(Debug)]
pub struct UdpSink {
    socket: UdpSocket,
}

impl UdpSink {
    /// 绑定本地地址并连接远端
    pub fn connect(local: impl ToSocketAddrs, remote: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        debug!(
            "UDP sink {} -> {}",
            socket.local_addr()?,
            socket.peer_addr()?
        );
        Ok(Self { socket })
    }

    /// 发送一帧；返回发送字节数，失败返回 -1
    pub fn send(&self, data: &[u8]) -> i32 {
        match self.socket.send(data) {
            Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
            Err(e) => {
                // 失败由发送器按返回值统计并限频告警
                debug!("UDP send failed: {}", e);
                -1
            },
        }
    }

    /// 本地地址
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// 转换为发送回调
    pub fn into_sink(self) -> Sink {
        Arc::new(move |data: &[u8], _ctx: &SendContext| self.send(data))
    }
}
