//! Windows 플랫폼: 창 메시지 기반 클릭.
//!
//! `ScreenToClient` + `PostMessageW(WM_LBUTTONDOWN/UP)`. 커서를 움직이지 않는다.

#![cfg(target_os = "windows")]

use autoapprove_core::error::CoreError;
use autoapprove_core::models::target::WindowRef;
use windows_sys::Win32::Foundation::{HWND, POINT};
use windows_sys::Win32::Graphics::Gdi::ScreenToClient;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    IsWindow, PostMessageW, WM_LBUTTONDOWN, WM_LBUTTONUP,
};

const MK_LBUTTON: usize = 0x0001;

fn make_lparam(x: i32, y: i32) -> isize {
    (((y as u16 as u32) << 16) | (x as u16 as u32)) as isize
}

/// 화면 좌표 (x, y)에 왼쪽 클릭 메시지를 게시
pub fn post_left_click(window: WindowRef, x: i32, y: i32) -> Result<(), CoreError> {
    let hwnd = window.0 as usize as HWND;
    unsafe {
        if IsWindow(hwnd) == 0 {
            return Err(CoreError::DispatchFailed(format!(
                "대상 창이 유효하지 않음: {window}"
            )));
        }
        let mut pt = POINT { x, y };
        if ScreenToClient(hwnd, &mut pt) == 0 {
            return Err(CoreError::DispatchFailed(
                "ScreenToClient 좌표 변환 실패".to_string(),
            ));
        }
        let lparam = make_lparam(pt.x, pt.y);
        if PostMessageW(hwnd, WM_LBUTTONDOWN, MK_LBUTTON, lparam) == 0
            || PostMessageW(hwnd, WM_LBUTTONUP, 0, lparam) == 0
        {
            return Err(CoreError::DispatchFailed(
                "PostMessageW 전달 실패".to_string(),
            ));
        }
    }
    Ok(())
}
