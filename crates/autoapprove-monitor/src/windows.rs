//! Windows 플랫폼: 창 클래스 이름, 포그라운드 창.
//!
//! Win32 API `GetClassNameW` + `GetForegroundWindow` + `IsWindow` 기반.

#![cfg(target_os = "windows")]

use windows_sys::Win32::Foundation::HWND;
use windows_sys::Win32::UI::WindowsAndMessaging::{GetClassNameW, GetForegroundWindow, IsWindow};

fn to_hwnd(window: u64) -> HWND {
    window as usize as HWND
}

/// 창 클래스 이름 조회
pub fn class_name(window: u64) -> Option<String> {
    unsafe {
        let hwnd = to_hwnd(window);
        if IsWindow(hwnd) == 0 {
            return None;
        }
        let mut buf = [0u16; 256];
        let len = GetClassNameW(hwnd, buf.as_mut_ptr(), buf.len() as i32);
        if len > 0 {
            Some(String::from_utf16_lossy(&buf[..len as usize]))
        } else {
            None
        }
    }
}

/// 현재 포그라운드 창 핸들
pub fn foreground_window() -> Option<u64> {
    unsafe {
        let hwnd = GetForegroundWindow();
        if hwnd.is_null() {
            None
        } else {
            Some(hwnd as usize as u64)
        }
    }
}
